//! Key-value stores
//!
//! `KeyValueStore` is the storage seam of `KeyValueStoreDiscovery`. Values are
//! plain JSON. `MemoryStore` keeps them in a map; `JsonFileStore` also
//! persists the whole map to one JSON file after every write.

use crate::errors::StoreError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub trait KeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    fn get_or(&self, key: &str, default: Value) -> StoreResult<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Values of several keys; missing keys are left out
    fn get_multiple(&self, keys: &[&str]) -> StoreResult<BTreeMap<String, Value>> {
        let mut values = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get(key)? {
                values.insert((*key).to_string(), value);
            }
        }
        Ok(values)
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()>;

    /// Write several keys at once; implementations may batch the write
    fn set_multiple(&mut self, values: BTreeMap<String, Value>) -> StoreResult<()> {
        for (key, value) in values {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Remove a key; returns whether it existed
    fn remove(&mut self, key: &str) -> StoreResult<bool>;

    fn remove_multiple(&mut self, keys: &[String]) -> StoreResult<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }

    /// Remove `removed` and write `values` as one change
    ///
    /// Either every key is updated or, on error, none is.
    fn apply(&mut self, values: BTreeMap<String, Value>, removed: &[String]) -> StoreResult<()> {
        self.remove_multiple(removed)?;
        self.set_multiple(values)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All keys, sorted
    fn keys(&self) -> StoreResult<Vec<String>>;

    fn clear(&mut self) -> StoreResult<()>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.values.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.values.contains_key(key))
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.values.keys().cloned().collect())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.values.clear();
        Ok(())
    }
}

// =============================================================================
// JSON FILE STORE
// =============================================================================

/// Store persisted as one JSON object, rewritten atomically on each write
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        debug!("Opened key-value store at {:?} ({} keys)", path, values.len());
        Ok(JsonFileStore { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `next` and make it the current contents
    ///
    /// The in-memory map only changes once the file has been replaced.
    fn commit(&mut self, next: BTreeMap<String, Value>) -> StoreResult<()> {
        write_atomic(&self.path, &serde_json::to_string_pretty(&next)?)?;
        self.values = next;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> StoreResult<()> {
        let mut next = self.values.clone();
        next.insert(key.to_string(), value);
        self.commit(next)
    }

    fn set_multiple(&mut self, values: BTreeMap<String, Value>) -> StoreResult<()> {
        self.apply(values, &[])
    }

    fn remove(&mut self, key: &str) -> StoreResult<bool> {
        if !self.values.contains_key(key) {
            return Ok(false);
        }
        let mut next = self.values.clone();
        next.remove(key);
        self.commit(next)?;
        Ok(true)
    }

    fn remove_multiple(&mut self, keys: &[String]) -> StoreResult<()> {
        self.apply(BTreeMap::new(), keys)
    }

    fn apply(&mut self, values: BTreeMap<String, Value>, removed: &[String]) -> StoreResult<()> {
        let mut next = self.values.clone();
        let mut changed = false;
        for key in removed {
            changed |= next.remove(key).is_some();
        }
        changed |= !values.is_empty();
        next.extend(values);
        if !changed {
            return Ok(());
        }
        self.commit(next)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.values.contains_key(key))
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.values.keys().cloned().collect())
    }

    fn clear(&mut self) -> StoreResult<()> {
        self.commit(BTreeMap::new())
    }
}

/// Write `content` to a sibling temp file, then rename it over `path`
pub(crate) fn write_atomic(path: &Path, content: &str) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);
    {
        let file = std::fs::File::create(&temp_path)?;
        let mut writer = std::io::BufWriter::with_capacity(64 * 1024, file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}
