//! Purpose: Public value types for the MarkLogic REST operations.
//! Exports: `DocumentContent`, `Format`, `Permission`, `Capability`, and the
//! per-operation option structs.
//! Role: Stable request vocabulary; `Client` turns these into wire calls.
//! Invariants: Content kind and format are intrinsic to the value, never
//! guessed from shape.

use crate::core::error::{Error, ErrorKind};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Json,
    Xml,
    Text,
    Binary,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Text => "text",
            Format::Binary => "binary",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml",
            Format::Text => "text/plain",
            Format::Binary => "application/octet-stream",
        }
    }

    pub fn accept(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml",
            Format::Text => "text/plain",
            Format::Binary => "application/octet-stream",
        }
    }
}

/// A document body with an explicit content kind.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentContent {
    Json(Value),
    Xml(String),
    Text(String),
    Binary(Vec<u8>),
}

impl DocumentContent {
    pub fn format(&self) -> Format {
        match self {
            DocumentContent::Json(_) => Format::Json,
            DocumentContent::Xml(_) => Format::Xml,
            DocumentContent::Text(_) => Format::Text,
            DocumentContent::Binary(_) => Format::Binary,
        }
    }

    pub fn content_type(&self) -> &'static str {
        self.format().content_type()
    }

    /// Serialized request body. JSON values are encoded as JSON text; the
    /// other kinds are sent as-is.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        match self {
            DocumentContent::Json(value) => serde_json::to_vec(value).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode document json")
                    .with_source(err)
            }),
            DocumentContent::Xml(text) | DocumentContent::Text(text) => Ok(text.clone().into_bytes()),
            DocumentContent::Binary(bytes) => Ok(bytes.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capability {
    Read,
    Insert,
    Update,
    NodeUpdate,
    Execute,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Insert => "insert",
            Capability::Update => "update",
            Capability::NodeUpdate => "node-update",
            Capability::Execute => "execute",
        }
    }
}

/// A role paired with the capabilities it is granted on a document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Permission {
    pub role: String,
    pub capabilities: Vec<Capability>,
}

impl Permission {
    pub fn new(role: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            role: role.into(),
            capabilities,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    pub collections: Vec<String>,
    pub permissions: Vec<Permission>,
    pub txid: Option<String>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    pub format: Option<Format>,
    pub txid: Option<String>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// Response format; drives both the `Accept` header and the `format`
    /// query parameter.
    pub format: Format,
    /// Extra query parameters merged verbatim into the search call.
    pub params: Vec<(String, String)>,
    pub txid: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self {
            format: Format::Json,
            params: Vec::new(),
            txid: None,
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EvalLanguage {
    #[default]
    Xquery,
    Javascript,
}

impl EvalLanguage {
    /// Form field name on the eval endpoint.
    pub fn form_key(self) -> &'static str {
        match self {
            EvalLanguage::Xquery => "xquery",
            EvalLanguage::Javascript => "javascript",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EvalOptions {
    pub language: EvalLanguage,
    /// External variables, serialized to a JSON string when a non-empty object.
    pub vars: Option<Value>,
    pub database: Option<String>,
    pub txid: Option<String>,
}

impl EvalOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::{Capability, DocumentContent, EvalLanguage, Format};
    use serde_json::json;

    #[test]
    fn format_is_intrinsic_to_content() {
        assert_eq!(DocumentContent::Json(json!({})).format(), Format::Json);
        assert_eq!(
            DocumentContent::Xml("<a/>".to_string()).format(),
            Format::Xml
        );
        assert_eq!(
            DocumentContent::Binary(vec![0xde, 0xad]).format(),
            Format::Binary
        );
    }

    #[test]
    fn json_content_serializes_to_json_text() {
        let content = DocumentContent::Json(json!({"title": "Test"}));
        assert_eq!(content.content_type(), "application/json");
        let bytes = content.to_bytes().expect("bytes");
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");
        assert_eq!(parsed["title"], "Test");
    }

    #[test]
    fn capability_names_match_rest_api() {
        assert_eq!(Capability::Read.as_str(), "read");
        assert_eq!(Capability::NodeUpdate.as_str(), "node-update");
    }

    #[test]
    fn eval_language_form_keys() {
        assert_eq!(EvalLanguage::Xquery.form_key(), "xquery");
        assert_eq!(EvalLanguage::Javascript.form_key(), "javascript");
    }
}
