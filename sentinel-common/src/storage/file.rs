//! JSON-file-backed storage backend.
//!
//! Each namespace is one JSON document under the base directory. The full
//! namespace is kept in memory and written through on every mutation, which
//! keeps individual puts atomic with respect to concurrent readers of the
//! same handle.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{KvPair, KvStore, StorageError, StorageService};

/// File-backed storage rooted at a base directory.
pub struct FileStorage {
    dir: PathBuf,
    namespaces: RwLock<HashMap<String, Arc<FileKv>>>,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            namespaces: RwLock::new(HashMap::new()),
        }
    }
}

impl StorageService for FileStorage {
    fn store(&self, namespace: &str) -> Arc<dyn KvStore> {
        let mut namespaces = self.namespaces.write();
        let store = namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(FileKv::open(self.dir.join(format!("{namespace}.json")))));
        Arc::clone(store) as Arc<dyn KvStore>
    }
}

struct FileKv {
    path: PathBuf,
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl FileKv {
    fn open(path: PathBuf) -> Self {
        let data = match load(&path) {
            Ok(data) => data,
            Err(e) => {
                // Unreadable namespace files start empty; the next write
                // replaces them.
                debug!(path = %path.display(), error = %e, "starting namespace empty");
                BTreeMap::new()
            }
        };
        Self {
            path,
            data: RwLock::new(data),
        }
    }

    fn flush(&self, data: &BTreeMap<String, Vec<u8>>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::Write(format!("{}: {e}", parent.display())))?;
        }
        let encoded = serde_json::to_vec_pretty(data)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        fs::write(&self.path, encoded)
            .map_err(|e| StorageError::Write(format!("{}: {e}", self.path.display())))
    }
}

fn load(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, StorageError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content =
        fs::read(path).map_err(|e| StorageError::Read(format!("{}: {e}", path.display())))?;
    serde_json::from_slice(&content).map_err(|e| StorageError::Encoding(e.to_string()))
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut data = self.data.write();
        data.insert(key.to_string(), value);
        self.flush(&data)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut data = self.data.write();
        data.remove(key);
        self.flush(&data)
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
