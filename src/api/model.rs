//! Purpose: Lightweight document model over the REST client.
//! Exports: `Model` (class-level handle), `Record` (instance).
//! Role: find/create/search plus save/update/destroy with change tracking.
//! Invariants: `persisted` implies a URI; the dirty set is empty after
//! construction, a successful save, and destroy.
//! Invariants: Records talk to the server only through the `Client`.
#![allow(clippy::result_large_err)]

use crate::api::attributes::{Attributes, Schema};
use crate::api::client::{ApiResult, Client};
use crate::api::document::{DocumentContent, Format, ReadOptions, SearchOptions, WriteOptions};
use crate::core::error::{Error, ErrorKind};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use uuid::Uuid;

/// Class-level handle for one model type: the schema plus the API client the
/// type's records go through. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Model {
    schema: Arc<Schema>,
    client: Client,
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    results: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    content: Option<Value>,
}

impl Model {
    pub fn new(schema: Schema, client: Client) -> Self {
        Self {
            schema: Arc::new(schema),
            client,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Construct a record from an attributes payload. `uri` and `persisted`
    /// are pulled out of the payload first; the remainder goes to the declared
    /// attributes (undeclared keys are dropped). Change tracking starts clean.
    pub fn build(&self, payload: &Map<String, Value>) -> Record {
        let uri = payload
            .get("uri")
            .and_then(Value::as_str)
            .map(str::to_string);
        let persisted = payload
            .get("persisted")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut attributes = Attributes::from_schema(&self.schema);
        let mut rest = payload.clone();
        rest.remove("uri");
        rest.remove("persisted");
        attributes.assign_known(&rest);
        attributes.clear_changes();
        Record {
            model: self.clone(),
            persisted: persisted && uri.is_some(),
            uri,
            attributes,
        }
    }

    /// Fetch one document as a persisted record. A 404 from the server is a
    /// `NotFound` error, distinct from other API failures.
    pub fn find(&self, uri: &str) -> ApiResult<Record> {
        let mut options = ReadOptions::new();
        options.format = Some(Format::Json);
        let response = self.client.read_document(uri, &options).map_err(|err| {
            if err.kind() == ErrorKind::Api && err.status() == Some(404) {
                let not_found = Error::new(ErrorKind::NotFound)
                    .with_message("document not found")
                    .with_status(404)
                    .with_url(uri);
                match err.body() {
                    Some(body) => not_found.with_body(body),
                    None => not_found,
                }
            } else {
                err
            }
        })?;
        let value = response.json()?;
        let Value::Object(mut payload) = value else {
            return Err(Error::new(ErrorKind::Api)
                .with_message("document body is not a json object")
                .with_url(uri));
        };
        payload.insert("uri".to_string(), json!(uri));
        payload.insert("persisted".to_string(), json!(true));
        Ok(self.build(&payload))
    }

    /// Build and immediately save. Always returns the record; callers check
    /// `persisted()` to detect a failed save.
    pub fn create(&self, payload: &Map<String, Value>) -> Record {
        let mut record = self.build(payload);
        record.save();
        record
    }

    /// String-query search returning records. The response format is forced
    /// to JSON regardless of the caller's options. Items carrying inline
    /// content become records directly; URI-only items cost one extra fetch
    /// each and are skipped (with a warning) when that fetch fails.
    pub fn search(&self, qtext: &str, options: &SearchOptions) -> ApiResult<Vec<Record>> {
        let mut options = options.clone();
        options.format = Format::Json;
        let response = self.client.search(qtext, &options)?;
        let envelope: SearchEnvelope = serde_json::from_slice(response.body()).map_err(|err| {
            Error::new(ErrorKind::Api)
                .with_message("invalid search response json")
                .with_source(err)
        })?;

        let mut records = Vec::new();
        for item in envelope.results {
            match item.content {
                Some(Value::Object(mut payload)) => {
                    if let Some(uri) = &item.uri {
                        payload.insert("uri".to_string(), json!(uri));
                    }
                    payload.insert("persisted".to_string(), json!(true));
                    records.push(self.build(&payload));
                }
                _ => {
                    let Some(uri) = item.uri.filter(|uri| !uri.is_empty()) else {
                        tracing::warn!("skipping search result without content or uri");
                        continue;
                    };
                    match self.find(&uri) {
                        Ok(record) => records.push(record),
                        Err(err)
                            if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::Api) =>
                        {
                            tracing::warn!(uri = %uri, error = %err, "skipping search result");
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
        Ok(records)
    }
}

/// One document instance bound to its model type.
#[derive(Clone, Debug)]
pub struct Record {
    model: Model,
    uri: Option<String>,
    persisted: bool,
    attributes: Attributes,
}

impl Record {
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn persisted(&self) -> bool {
        self.persisted
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.attributes.set(name, value)
    }

    /// Every declared attribute as a JSON map, nulls included.
    pub fn attributes(&self) -> Map<String, Value> {
        self.attributes.to_map()
    }

    pub fn changed(&self) -> bool {
        self.attributes.changed()
    }

    pub fn changes(&self) -> Vec<(String, (Value, Value))> {
        self.attributes.changes()
    }

    pub fn changed_names(&self) -> Vec<&str> {
        self.attributes.changed_names()
    }

    pub fn previous(&self, name: &str) -> Option<&Value> {
        self.attributes.previous(name)
    }

    /// Write the full attribute set as a JSON document. New records get a
    /// generated URI before the first write. API failures come back as
    /// `false` with the record left unchanged.
    pub fn save(&mut self) -> bool {
        let uri = self
            .uri
            .get_or_insert_with(|| generate_uri(self.model.schema.name()))
            .clone();
        let content = DocumentContent::Json(Value::Object(self.attributes.to_map()));
        match self
            .model
            .client
            .write_document(&uri, &content, &WriteOptions::new())
        {
            Ok(_) => {
                self.persisted = true;
                self.attributes.clear_changes();
                true
            }
            Err(err) => {
                tracing::warn!(uri = %uri, error = %err, "document save failed");
                false
            }
        }
    }

    /// Strict assignment (unknown attribute is an error), then save.
    pub fn update(&mut self, values: &Map<String, Value>) -> ApiResult<bool> {
        self.attributes.assign(values)?;
        Ok(self.save())
    }

    /// Delete the backing document. A record that was never saved returns
    /// `false` without touching the network; the URI is retained either way.
    pub fn destroy(&mut self) -> bool {
        if !self.persisted {
            return false;
        }
        let Some(uri) = self.uri.clone() else {
            return false;
        };
        match self.model.client.delete_document(&uri, None) {
            Ok(_) => {
                self.persisted = false;
                self.attributes.clear_changes();
                true
            }
            Err(err) => {
                tracing::warn!(uri = %uri, error = %err, "document destroy failed");
                false
            }
        }
    }
}

fn generate_uri(model_name: &str) -> String {
    format!("/documents/{}/{}.json", model_name.to_lowercase(), Uuid::new_v4())
}
