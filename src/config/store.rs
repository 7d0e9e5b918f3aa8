//! Key-value config store with durable writes

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Synchronous key-value access; every `set` is persisted before returning
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError>;

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All stored keys
    fn snapshot(&self) -> Map<String, Value>;
}

/// Typed read; values that fail to decode are treated as absent
pub fn load<T: DeserializeOwned>(store: &dyn ConfigStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key = key, error = %e, "Ignoring malformed config value");
            None
        }
    }
}

pub fn save<T: Serialize + ?Sized>(
    store: &dyn ConfigStore,
    key: &str,
    value: &T,
) -> Result<(), ConfigError> {
    store.set(key, serde_json::to_value(value)?)
}

/// JSON file backed store; writes go to a temp file that is renamed into place
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let data = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                _ => Map::new(),
            }
        } else {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
            Map::new()
        };
        debug!(path = %path.display(), keys = data.len(), "Config store opened");

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, data: &Map<String, Value>) -> Result<(), ConfigError> {
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(data)?;
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, body).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut data = self.data.lock();
        data.insert(key.to_string(), value);
        self.write_atomic(&data)
    }

    fn snapshot(&self) -> Map<String, Value> {
        self.data.lock().clone()
    }
}

/// In-memory store for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: Value) -> Self {
        let data = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            data: Mutex::new(data),
        }
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.data.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn snapshot(&self) -> Map<String, Value> {
        self.data.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_json_store_persists_each_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert!(!store.has("apiKey"));
        store.set("apiKey", json!("t0-free-rpdb")).unwrap();
        save(&store, "lastRetryMonth", &4).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("apiKey"), Some(json!("t0-free-rpdb")));
        assert_eq!(load::<i32>(&reopened, "lastRetryMonth"), Some(4));
        assert!(!dir.path().join("nested/config.json.tmp").exists());
    }

    #[test]
    fn test_malformed_value_reads_as_absent() {
        let store = MemoryStore::with_values(json!({ "lastRetryMonth": "soon" }));
        assert_eq!(load::<i32>(&store, "lastRetryMonth"), None);
        assert!(store.has("lastRetryMonth"));
    }
}
