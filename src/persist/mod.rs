//! Durable cache: the storage abstraction, the persisted layout and its
//! backends.

/// Load and save of whole stores through [`KvStorage`].
pub mod cache;
/// Versioned document layout and migration of older documents.
pub mod layout;
/// In-memory backend.
pub mod memory;
/// SQLite backend.
pub mod sqlite;

use thiserror::Error;

/// Storage or encoding failure.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The SQLite backend failed.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A document could not be encoded.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Any other backend failure.
    #[error("{0}")]
    Message(String),
}

/// Result of a storage operation.
pub type PersistResult<T> = Result<T, PersistError>;

/// On-device key/value storage holding one serialized document per store.
pub trait KvStorage: Send {
    /// Document stored under `key`, if any.
    fn get(&self, key: &str) -> PersistResult<Option<String>>;
    /// Replaces the document under `key`.
    fn set(&mut self, key: &str, value: &str) -> PersistResult<()>;
    /// Deletes the document under `key`. Missing keys are not an error.
    fn remove(&mut self, key: &str) -> PersistResult<()>;
    /// Makes earlier writes durable.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}
