//! Archivist core library.
//!
//! This crate provides the client-side building blocks shared by the
//! archivist front ends:
//!
//! - `auth`: the session store, its scoped provider, the auth backend
//!   client and keychain-backed credential storage
//! - `api`: the resource (spreadsheet script) client and the archive
//!   upload client
//! - `storage`: the durable key-value surface the session persists through
//! - `models`: user and record types
//! - `config`: application configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use api::{ApiError, ArchiveClient, ArchiveError, MediaKind, ResourceClient, UploadFile, UploadReceipt};
pub use auth::{AuthBackend, HttpAuthBackend, NewUser, SessionState, SessionStore};
pub use config::Config;
pub use models::{Record, User};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
