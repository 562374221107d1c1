//! Purpose: MarkLogic REST API operations over a `Connection`.
//! Exports: `Client`, `ApiResult`.
//! Role: Translates typed parameters into `/v1/...` calls and status codes
//! into the error taxonomy.
//! Invariants: 2xx responses pass through unmodified; 401 is Authentication,
//! everything else non-2xx is Api with status and body attached.
//! Invariants: Argument validation happens before any network I/O.
#![allow(clippy::result_large_err)]

use crate::api::document::{
    DocumentContent, EvalOptions, ReadOptions, SearchOptions, WriteOptions,
};
use crate::core::connection::{Connection, RequestOptions, Response};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind};
use serde_json::Value;

pub type ApiResult<T> = Result<T, Error>;

const DOCUMENTS_PATH: &str = "/v1/documents";
const SEARCH_PATH: &str = "/v1/search";
const EVAL_PATH: &str = "/v1/eval";

#[derive(Clone, Debug)]
pub struct Client {
    connection: Connection,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self {
            connection: Connection::new(config),
        }
    }

    /// Build a client from the process-wide default configuration.
    pub fn from_default() -> Self {
        Self {
            connection: Connection::from_default(),
        }
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Release the underlying channel.
    pub fn shutdown(self) {
        self.connection.shutdown();
    }

    /// PUT a document at `uri`. Content kind, format parameter, and
    /// content-type all come from the `DocumentContent` variant.
    pub fn write_document(
        &self,
        uri: &str,
        content: &DocumentContent,
        options: &WriteOptions,
    ) -> ApiResult<Response> {
        let mut request = RequestOptions::new();
        request.query = write_query(uri, content, options)?;
        request.headers = vec![("Content-Type".to_string(), content.content_type().to_string())];
        request.body = Some(content.to_bytes()?);
        let response = self.connection.put(DOCUMENTS_PATH, &request)?;
        ensure_success(response, "document write")
    }

    pub fn read_document(&self, uri: &str, options: &ReadOptions) -> ApiResult<Response> {
        let mut request = RequestOptions::new();
        request.query.push(("uri".to_string(), uri.to_string()));
        if let Some(format) = options.format {
            request
                .query
                .push(("format".to_string(), format.as_str().to_string()));
        }
        if let Some(txid) = &options.txid {
            request.query.push(("txid".to_string(), txid.clone()));
        }
        let response = self.connection.get(DOCUMENTS_PATH, &request)?;
        ensure_success(response, "document read")
    }

    pub fn delete_document(&self, uri: &str, txid: Option<&str>) -> ApiResult<Response> {
        let mut request = RequestOptions::new();
        request.query.push(("uri".to_string(), uri.to_string()));
        if let Some(txid) = txid {
            request.query.push(("txid".to_string(), txid.to_string()));
        }
        let response = self.connection.delete(DOCUMENTS_PATH, &request)?;
        ensure_success(response, "document delete")
    }

    /// String-query search. Caller params are merged verbatim after `q` and
    /// `format`; the `Accept` header follows the requested format.
    pub fn search(&self, query: &str, options: &SearchOptions) -> ApiResult<Response> {
        let mut request = RequestOptions::new();
        request.query.push(("q".to_string(), query.to_string()));
        request
            .query
            .push(("format".to_string(), options.format.as_str().to_string()));
        for (name, value) in &options.params {
            request.query.push((name.clone(), value.clone()));
        }
        if let Some(txid) = &options.txid {
            request.query.push(("txid".to_string(), txid.clone()));
        }
        request.headers = vec![("Accept".to_string(), options.format.accept().to_string())];
        let response = self.connection.get(SEARCH_PATH, &request)?;
        ensure_success(response, "search")
    }

    /// Server-side code evaluation. The response body is returned raw;
    /// multipart decomposition is the caller's concern.
    pub fn eval(&self, code: &str, options: &EvalOptions) -> ApiResult<Response> {
        let mut request = RequestOptions::new();
        request.headers = vec![
            (
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ),
            ("Accept".to_string(), "multipart/mixed".to_string()),
        ];
        request.body = Some(eval_form_body(code, options)?.into_bytes());
        let response = self.connection.post(EVAL_PATH, &request)?;
        ensure_success(response, "eval")
    }
}

fn write_query(
    uri: &str,
    content: &DocumentContent,
    options: &WriteOptions,
) -> ApiResult<Vec<(String, String)>> {
    let mut query = vec![("uri".to_string(), uri.to_string())];
    if !options.collections.is_empty() {
        query.push(("collection".to_string(), options.collections.join(",")));
    }
    for permission in &options.permissions {
        if permission.role.is_empty() || permission.capabilities.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("malformed permission entry")
                .with_hint("Permissions need a role name and at least one capability."));
        }
        let capabilities = permission
            .capabilities
            .iter()
            .map(|capability| capability.as_str())
            .collect::<Vec<_>>()
            .join(",");
        query.push((format!("perm:{}", permission.role), capabilities));
    }
    query.push(("format".to_string(), content.format().as_str().to_string()));
    if let Some(txid) = &options.txid {
        query.push(("txid".to_string(), txid.clone()));
    }
    Ok(query)
}

fn eval_form_body(code: &str, options: &EvalOptions) -> ApiResult<String> {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair(options.language.form_key(), code);
    if let Some(vars) = &options.vars {
        if let Value::Object(map) = vars {
            if !map.is_empty() {
                let encoded = serde_json::to_string(vars).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode eval vars")
                        .with_source(err)
                })?;
                form.append_pair("vars", &encoded);
            }
        } else {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message("eval vars must be a json object"));
        }
    }
    if let Some(database) = &options.database {
        form.append_pair("database", database);
    }
    if let Some(txid) = &options.txid {
        form.append_pair("txid", txid);
    }
    Ok(form.finish())
}

fn ensure_success(response: Response, context: &str) -> ApiResult<Response> {
    match response.status() {
        200..=299 => Ok(response),
        401 => Err(Error::new(ErrorKind::Authentication)
            .with_message("authentication failed")
            .with_status(401)
            .with_body(response.text_lossy())),
        404 => Err(Error::new(ErrorKind::Api)
            .with_message("not found")
            .with_status(404)
            .with_body(response.text_lossy())),
        status => Err(Error::new(ErrorKind::Api)
            .with_message(format!("{context} failed"))
            .with_status(status)
            .with_body(response.text_lossy())),
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_success, eval_form_body, write_query};
    use crate::api::document::{
        Capability, DocumentContent, EvalLanguage, EvalOptions, Permission, WriteOptions,
    };
    use crate::core::connection::Response;
    use crate::core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn write_query_builds_collection_and_perm_pairs() {
        let mut options = WriteOptions::new();
        options.collections = vec!["articles".to_string(), "drafts".to_string()];
        options.permissions = vec![Permission::new(
            "editor",
            vec![Capability::Read, Capability::Update],
        )];
        options.txid = Some("tx-9".to_string());
        let content = DocumentContent::Json(json!({}));
        let query = write_query("/docs/a.json", &content, &options).expect("query");
        assert_eq!(
            query,
            vec![
                ("uri".to_string(), "/docs/a.json".to_string()),
                ("collection".to_string(), "articles,drafts".to_string()),
                ("perm:editor".to_string(), "read,update".to_string()),
                ("format".to_string(), "json".to_string()),
                ("txid".to_string(), "tx-9".to_string()),
            ]
        );
    }

    #[test]
    fn write_query_rejects_malformed_permission() {
        let mut options = WriteOptions::new();
        options.permissions = vec![Permission::new("editor", Vec::new())];
        let content = DocumentContent::Json(json!({}));
        let err = write_query("/docs/a.json", &content, &options).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn eval_form_body_defaults_to_xquery() {
        let body = eval_form_body("fn:current-date()", &EvalOptions::new()).expect("body");
        assert_eq!(body, "xquery=fn%3Acurrent-date%28%29");
    }

    #[test]
    fn eval_form_body_includes_vars_database_and_txid() {
        let mut options = EvalOptions::new();
        options.language = EvalLanguage::Javascript;
        options.vars = Some(json!({"n": 1}));
        options.database = Some("Documents".to_string());
        options.txid = Some("tx-1".to_string());
        let body = eval_form_body("cts.doc(uri)", &options).expect("body");
        assert!(body.starts_with("javascript=cts.doc%28uri%29"));
        assert!(body.contains("vars=%7B%22n%22%3A1%7D"));
        assert!(body.contains("database=Documents"));
        assert!(body.contains("txid=tx-1"));
    }

    #[test]
    fn eval_form_body_skips_empty_vars() {
        let mut options = EvalOptions::new();
        options.vars = Some(json!({}));
        let body = eval_form_body("1 + 1", &options).expect("body");
        assert!(!body.contains("vars="));
    }

    #[test]
    fn ensure_success_passes_2xx_through() {
        let response = Response::synthetic(201, Vec::new(), Vec::new());
        let response = ensure_success(response, "document write").expect("ok");
        assert_eq!(response.status(), 201);
    }

    #[test]
    fn ensure_success_maps_401_to_authentication() {
        let response = Response::synthetic(401, Vec::new(), b"denied".to_vec());
        let err = ensure_success(response, "document read").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.body(), Some("denied"));
    }

    #[test]
    fn ensure_success_maps_404_and_5xx_to_api() {
        let err = ensure_success(Response::synthetic(404, Vec::new(), Vec::new()), "document read")
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.status(), Some(404));

        let err = ensure_success(Response::synthetic(503, Vec::new(), Vec::new()), "search")
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.message(), Some("search failed"));
    }
}
