//! Durable key-value surface.
//!
//! The session store persists the current user through a `KeyValueStore`.
//! Two implementations are provided:
//! - `FileStore`: one JSON file per key inside a directory
//! - `MemoryStore`: process-local map, used by tests and ephemeral sessions

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use anyhow::Result;

/// String-keyed storage that survives between runs.
///
/// Writes are unconditional; there is no versioning or transaction discipline.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` means the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}
