//! Durable storage of override records.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use sentinel_common::storage::{KvStore, StorageError};

/// The storage namespace for all configuration override data.
pub const OVERRIDES_NAMESPACE: &str = "config_overrides";

/// Errors from the override store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Distinguished absence: callers treat this as "start from empty".
    #[error("no override exists for {0}")]
    NoOverrideExists(String),

    #[error("corrupt override record {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The persisted override state for one section or list element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    /// Section name, or `section/element` for list elements.
    pub id: String,
    /// Option name to raw override value. Contains exactly the keys that
    /// were set and not later deleted.
    #[serde(default)]
    pub overrides: BTreeMap<String, Value>,
    /// Whether this record describes an element created at runtime, which
    /// must be re-created whenever the section is resolved.
    #[serde(default)]
    pub create: bool,
}

impl OverrideRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            overrides: BTreeMap::new(),
            create: false,
        }
    }
}

/// Override records in a namespace of the external key-value store,
/// encoded as self-describing JSON.
#[derive(Clone)]
pub struct OverrideStore {
    kv: Arc<dyn KvStore>,
}

impl OverrideStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn get(&self, id: &str) -> Result<OverrideRecord, StoreError> {
        match self.kv.get(id)? {
            Some(raw) => decode(id, &raw),
            None => Err(StoreError::NoOverrideExists(id.to_string())),
        }
    }

    pub fn set(&self, record: &OverrideRecord) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(record).map_err(|e| StoreError::Corrupt {
            id: record.id.clone(),
            message: e.to_string(),
        })?;
        self.kv.put(&record.id, encoded)?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.kv.delete(id)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<OverrideRecord>, StoreError> {
        self.kv
            .list("")?
            .into_iter()
            .map(|pair| decode(&pair.key, &pair.value))
            .collect()
    }
}

fn decode(id: &str, raw: &[u8]) -> Result<OverrideRecord, StoreError> {
    serde_json::from_slice(raw).map_err(|e| StoreError::Corrupt {
        id: id.to_string(),
        message: e.to_string(),
    })
}
