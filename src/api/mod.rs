//! Purpose: Define the stable public Rust API boundary for the crate.
//! Exports: Client, document model, connection, configuration, and errors.
//! Role: Public, additive-only surface; hides internal transport modules.
//! Invariants: This module is the only public path to the transport layer.

mod attributes;
mod client;
mod document;
mod model;

pub use crate::core::config::{AuthScheme, Config, configure, default_config};
pub use crate::core::connection::{Connection, Method, RequestOptions, Response, USER_AGENT};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use attributes::{AttrType, Attributes, Schema};
pub use client::{ApiResult, Client};
pub use document::{
    Capability, DocumentContent, EvalLanguage, EvalOptions, Format, Permission, ReadOptions,
    SearchOptions, WriteOptions,
};
pub use model::{Model, Record};
