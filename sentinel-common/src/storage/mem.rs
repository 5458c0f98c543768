//! In-memory storage backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{KvPair, KvStore, StorageError, StorageService};

/// In-process storage, namespaced by name. Handles to the same namespace
/// share data, so a service can be closed and reopened against the same
/// `MemStorage` without losing state.
#[derive(Default)]
pub struct MemStorage {
    namespaces: RwLock<HashMap<String, Arc<MemKv>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageService for MemStorage {
    fn store(&self, namespace: &str) -> Arc<dyn KvStore> {
        let mut namespaces = self.namespaces.write();
        let store = namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(MemKv::default()));
        Arc::clone(store) as Arc<dyn KvStore>
    }
}

#[derive(Default)]
struct MemKv {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl KvStore for MemKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data.write().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<KvPair>, StorageError> {
        Ok(self
            .data
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| KvPair {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }
}
