//! Purpose: Internal transport and configuration modules.
//! Exports: `config`, `connection`, `error` (re-exported through `crate::api`).
//! Role: Everything beneath the MarkLogic REST semantics: plain HTTP plumbing.
//! Invariants: Nothing in here knows about documents, search, or models.
pub mod config;
pub mod connection;
pub mod error;
