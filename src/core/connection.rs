//! Purpose: One persistent HTTP channel to a MarkLogic instance.
//! Exports: `Connection`, `RequestOptions`, `Response`, `Method`, `USER_AGENT`.
//! Role: Verb-level request building and execution; no REST semantics.
//! Invariants: Responses pass through with their raw status; only transport
//! failures become errors at this layer.
//! Invariants: Clones share one pooled agent; the pool is released when the
//! last clone is dropped or shut down.
//! Invariants: A handle is single-owner per in-flight request sequence; no
//! concurrent-issuance guarantee is made.
#![allow(clippy::result_large_err)]

use crate::core::config::{self, AuthScheme, Config};
use crate::core::error::{Error, ErrorKind};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use url::{Position, Url};

/// `User-Agent` sent on every request.
pub const USER_AGENT: &str = concat!("marklogic/", env!("CARGO_PKG_VERSION"));

const DEFAULT_HEADERS: [(&str, &str); 3] = [
    ("User-Agent", USER_AGENT),
    ("Content-Type", "application/json"),
    ("Accept", "application/json"),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }

    /// Parse a verb name. Anything outside the supported set fails before any
    /// network I/O happens.
    pub fn parse(name: &str) -> Result<Self, Error> {
        let all = [
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Head,
        ];
        all.into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("unsupported http method: {name}"))
                    .with_hint("Supported methods are GET, POST, PUT, DELETE, HEAD.")
            })
    }
}

#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Raw response capture. The underlying transport response is consume-on-read,
/// so status, headers, and body are materialized up front.
#[derive(Clone, Debug)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn text(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.body).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("response body is not valid utf-8")
                .with_source(err)
        })
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<serde_json::Value, Error> {
        serde_json::from_slice(&self.body).map_err(|err| {
            Error::new(ErrorKind::Api)
                .with_message("invalid response json")
                .with_status(self.status)
                .with_source(err)
        })
    }

    #[cfg(test)]
    pub(crate) fn synthetic(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers,
            body,
        }
    }

    fn from_ureq(response: ureq::Response) -> Result<Self, Error> {
        let status = response.status();
        let status_text = response.status_text().to_string();
        let mut headers = Vec::new();
        for name in response.headers_names() {
            if let Some(value) = response.header(&name) {
                headers.push((name.clone(), value.to_string()));
            }
        }
        let mut body = Vec::new();
        response.into_reader().read_to_end(&mut body).map_err(|err| {
            Error::new(ErrorKind::Connection)
                .with_message("failed to read response body")
                .with_source(err)
        })?;
        Ok(Self {
            status,
            status_text,
            headers,
            body,
        })
    }
}

#[derive(Debug)]
struct ConnectionInner {
    config: Config,
    agent: ureq::Agent,
    // Last WWW-Authenticate challenge seen; answered pre-emptively until the
    // server reports it stale with another 401.
    challenge: Mutex<Option<String>>,
}

#[derive(Clone, Debug)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn new(config: Config) -> Self {
        let agent = ureq::AgentBuilder::new().build();
        Self {
            inner: Arc::new(ConnectionInner {
                config,
                agent,
                challenge: Mutex::new(None),
            }),
        }
    }

    /// Build a connection from the process-wide default configuration.
    pub fn from_default() -> Self {
        Self::new(config::default_config())
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn get(&self, path: &str, options: &RequestOptions) -> Result<Response, Error> {
        self.send(Method::Get, path, options)
    }

    pub fn post(&self, path: &str, options: &RequestOptions) -> Result<Response, Error> {
        self.send(Method::Post, path, options)
    }

    pub fn put(&self, path: &str, options: &RequestOptions) -> Result<Response, Error> {
        self.send(Method::Put, path, options)
    }

    pub fn delete(&self, path: &str, options: &RequestOptions) -> Result<Response, Error> {
        self.send(Method::Delete, path, options)
    }

    pub fn head(&self, path: &str, options: &RequestOptions) -> Result<Response, Error> {
        self.send(Method::Head, path, options)
    }

    /// Generic entry point taking the verb by name.
    pub fn request(
        &self,
        method: &str,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Response, Error> {
        let method = Method::parse(method)?;
        self.send(method, path, options)
    }

    /// Release this handle's reference to the pooled channel. Consuming the
    /// handle makes a double release unrepresentable; clones keep the pool
    /// alive until the last one goes.
    pub fn shutdown(self) {
        drop(self);
    }

    fn send(&self, method: Method, path: &str, options: &RequestOptions) -> Result<Response, Error> {
        let url = build_url(&self.inner.config, path, &options.query)?;
        let authorization = self.authorization(method, &url, options)?;
        let request = self.build_request(method, &url, options, authorization.as_deref());

        let response = match execute(request, options.body.as_deref()) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(transport_error(method, &url, transport));
            }
        };

        let response = self.retry_on_challenge(method, &url, options, response)?;
        tracing::debug!(
            method = method.as_str(),
            url = %url,
            status = response.status(),
            "request complete"
        );
        Response::from_ureq(response)
    }

    /// Digest challenge-response: a 401 carrying `WWW-Authenticate` refreshes
    /// the cached challenge and the request is re-issued once with a computed
    /// `Authorization`. Anything else passes through untouched.
    fn retry_on_challenge(
        &self,
        method: Method,
        url: &Url,
        options: &RequestOptions,
        response: ureq::Response,
    ) -> Result<ureq::Response, Error> {
        if response.status() != 401 || self.inner.config.auth != AuthScheme::Digest {
            return Ok(response);
        }
        let Some((username, password)) = self.inner.config.credentials() else {
            return Ok(response);
        };
        let Some(challenge) = response.header("www-authenticate").map(str::to_string) else {
            return Ok(response);
        };

        let authorization = digest_authorization(
            username,
            password,
            method,
            url,
            &challenge,
            options.body.as_deref(),
        )?;
        *self
            .inner
            .challenge
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(challenge);

        tracing::debug!(method = method.as_str(), url = %url, "answering digest challenge");
        let request = self.build_request(method, url, options, Some(&authorization));
        match execute(request, options.body.as_deref()) {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(_, response)) => Ok(response),
            Err(ureq::Error::Transport(transport)) => Err(transport_error(method, url, transport)),
        }
    }

    fn authorization(
        &self,
        method: Method,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<Option<String>, Error> {
        let Some((username, password)) = self.inner.config.credentials() else {
            return Ok(None);
        };
        match self.inner.config.auth {
            AuthScheme::Basic => Ok(Some(basic_authorization(username, password))),
            AuthScheme::Digest => {
                let challenge = self
                    .inner
                    .challenge
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let Some(challenge) = challenge else {
                    return Ok(None);
                };
                match digest_authorization(
                    username,
                    password,
                    method,
                    url,
                    &challenge,
                    options.body.as_deref(),
                ) {
                    Ok(authorization) => Ok(Some(authorization)),
                    Err(_) => {
                        // Unusable cached challenge; go unauthenticated and
                        // let the next 401 supply a fresh one.
                        *self
                            .inner
                            .challenge
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner) = None;
                        Ok(None)
                    }
                }
            }
        }
    }

    fn build_request(
        &self,
        method: Method,
        url: &Url,
        options: &RequestOptions,
        authorization: Option<&str>,
    ) -> ureq::Request {
        let mut request = self.inner.agent.request(method.as_str(), url.as_str());
        for (name, value) in resolve_headers(&options.headers) {
            request = request.set(&name, &value);
        }
        if let Some(authorization) = authorization {
            request = request.set("Authorization", authorization);
        }
        request
    }
}

fn execute(request: ureq::Request, body: Option<&[u8]>) -> Result<ureq::Response, ureq::Error> {
    match body {
        Some(bytes) => request.send_bytes(bytes),
        None => request.call(),
    }
}

fn transport_error(method: Method, url: &Url, transport: ureq::Transport) -> Error {
    Error::new(ErrorKind::Connection)
        .with_message("request failed")
        .with_method(method.as_str())
        .with_url(url.as_str())
        .with_source(transport)
}

fn build_url(config: &Config, path: &str, query: &[(String, String)]) -> Result<Url, Error> {
    let base = format!("http://{}:{}", config.host, config.port);
    let mut url = Url::parse(&base).map_err(|err| {
        Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("invalid host or port: {}:{}", config.host, config.port))
            .with_source(err)
    })?;
    url.set_path(path);
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Default headers unless the caller supplied the same header (any casing),
/// then the caller's headers in order.
fn resolve_headers(overrides: &[(String, String)]) -> Vec<(String, String)> {
    let mut headers = Vec::with_capacity(DEFAULT_HEADERS.len() + overrides.len());
    for (name, value) in DEFAULT_HEADERS {
        let overridden = overrides
            .iter()
            .any(|(other, _)| other.eq_ignore_ascii_case(name));
        if !overridden {
            headers.push((name.to_string(), value.to_string()));
        }
    }
    for (name, value) in overrides {
        headers.push((name.clone(), value.clone()));
    }
    headers
}

fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

fn digest_authorization(
    username: &str,
    password: &str,
    method: Method,
    url: &Url,
    challenge: &str,
    body: Option<&[u8]>,
) -> Result<String, Error> {
    let mut client = http_auth::PasswordClient::try_from(challenge).map_err(|err| {
        Error::new(ErrorKind::Authentication)
            .with_message(format!("unsupported authentication challenge: {err}"))
    })?;
    let uri = &url[Position::BeforePath..];
    client
        .respond(&http_auth::PasswordParams {
            username,
            password,
            uri,
            method: method.as_str(),
            body: Some(body.unwrap_or(&[])),
        })
        .map_err(|err| {
            Error::new(ErrorKind::Authentication)
                .with_message(format!("failed to answer authentication challenge: {err}"))
        })
}
