//! Per-extension local storage backing the host API's `LocalStorage`.
//!
//! Each extension owns one JSON file in its support directory. The whole map
//! is held in memory and rewritten on every mutation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::extensions::error::ExtensionResult;

/// File name of the storage map inside the support directory.
pub const STORAGE_FILE: &str = "storage.json";

/// Key-value store for one extension.
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    items: BTreeMap<String, Value>,
}

impl LocalStorage {
    /// Open the store under `support_dir`.
    ///
    /// A missing or corrupt file starts an empty store; the corrupt file is
    /// overwritten on the next write.
    pub fn open(support_dir: &Path) -> Self {
        let path = support_dir.join(STORAGE_FILE);
        let items = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt storage file");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self { path, items }
    }

    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            items: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.items.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: Value) -> ExtensionResult<()> {
        self.items.insert(key.to_string(), value);
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> ExtensionResult<()> {
        if self.items.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    /// Every stored item, ordered by key.
    pub fn all(&self) -> BTreeMap<String, Value> {
        self.items.clone()
    }

    pub fn clear(&mut self) -> ExtensionResult<()> {
        self.items.clear();
        self.flush()
    }

    fn flush(&self) -> ExtensionResult<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.items)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_basic_operations() {
        let temp = TempDir::new().unwrap();
        let mut storage = LocalStorage::open(temp.path());

        storage.set("token", json!("abc")).unwrap();
        storage.set("count", json!(3)).unwrap();
        assert_eq!(storage.get("token"), Some(json!("abc")));
        assert_eq!(storage.get("missing"), None);

        storage.remove("token").unwrap();
        assert_eq!(storage.get("token"), None);

        let all = storage.all();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["count"]);

        storage.clear().unwrap();
        assert!(storage.all().is_empty());
    }

    #[test]
    fn test_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        let support = temp.path().join("support").join("github");

        LocalStorage::open(&support).set("seen", json!(true)).unwrap();

        let reopened = LocalStorage::open(&support);
        assert_eq!(reopened.get("seen"), Some(json!(true)));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(STORAGE_FILE), "not json").unwrap();

        let mut storage = LocalStorage::open(temp.path());
        assert!(storage.all().is_empty());

        storage.set("k", json!(1)).unwrap();
        assert_eq!(LocalStorage::open(temp.path()).get("k"), Some(json!(1)));
    }

    #[test]
    fn test_in_memory_never_writes() {
        let mut storage = LocalStorage::in_memory();
        storage.set("k", json!("v")).unwrap();
        assert_eq!(storage.get("k"), Some(json!("v")));
    }
}
