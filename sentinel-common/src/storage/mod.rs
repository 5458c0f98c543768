//! Namespaced key-value storage used for durable server state.
//!
//! Services never talk to a concrete store directly; they ask a
//! [`StorageService`] for a namespace and work against the [`KvStore`]
//! handle they get back. Two implementations are provided: an in-memory
//! store for tests and embedded use, and a JSON-file-backed store for
//! single-node deployments.

mod file;
mod mem;

pub use file::FileStorage;
pub use mem::MemStorage;

use std::sync::Arc;

use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),

    #[error("storage encoding failed: {0}")]
    Encoding(String),
}

/// One key-value pair returned from a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

/// A handle to one namespace of the underlying store.
///
/// Individual `put`s are atomic with respect to concurrent reads; no
/// cross-key transactions are offered.
pub trait KvStore: Send + Sync {
    /// Fetch a value. Absence is `Ok(None)`, not an error.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a value, replacing any previous one.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Remove a value. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// All pairs whose key starts with `prefix`, ordered by key.
    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, StorageError>;
}

/// Hands out per-namespace store handles.
pub trait StorageService: Send + Sync {
    fn store(&self, namespace: &str) -> Arc<dyn KvStore>;
}
