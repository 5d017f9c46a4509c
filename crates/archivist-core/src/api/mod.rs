//! HTTP clients for the external services the front end talks to directly.
//!
//! - `ResourceClient`: CRUD against a spreadsheet-backed script endpoint.
//!   Writes are fire-and-forget; only `list` observes the response.
//! - `ArchiveClient`: streams files to the Internet Archive's S3-compatible
//!   API and returns the public download URL.
//!
//! Neither client retries.

pub mod archive;
pub mod error;
pub mod resources;

pub use archive::{ArchiveClient, ArchiveError, MediaKind, UploadFile, UploadReceipt};
pub use error::ApiError;
pub use resources::ResourceClient;
