use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// String key/value persistence, the local-storage seam of the app.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// JSON object on disk, re-read on every access.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read storage: {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse storage: {}", self.path.display()))
    }

    /// Entries to update. A file that no longer parses is replaced rather
    /// than blocking every later write.
    fn read_for_update(&self) -> Result<BTreeMap<String, String>> {
        match self.read_all() {
            Ok(entries) => Ok(entries),
            Err(err) if self.path.is_file() && err.is::<serde_json::Error>() => {
                warn!("{:#}; starting a fresh storage file", err);
                Ok(BTreeMap::new())
            }
            Err(err) => Err(err),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create storage dir: {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write storage: {}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.read_for_update()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut entries = self.read_for_update()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("storage.json");

        let mut store = FileStore::new(&path);
        assert_eq!(store.get("ocr_app_credits").expect("get"), None);
        store.set("ocr_app_credits", "7").expect("set");
        store.set("other", "x").expect("set");

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("ocr_app_credits").expect("get").as_deref(),
            Some("7")
        );
        assert_eq!(reopened.get("other").expect("get").as_deref(), Some("x"));
    }

    #[test]
    fn file_store_remove_drops_only_that_key() {
        let dir = tempdir().expect("tempdir");
        let mut store = FileStore::new(dir.path().join("storage.json"));
        store.set("a", "1").expect("set");
        store.set("b", "2").expect("set");
        store.remove("a").expect("remove");
        assert_eq!(store.get("a").expect("get"), None);
        assert_eq!(store.get("b").expect("get").as_deref(), Some("2"));
    }

    #[test]
    fn file_store_reports_corrupt_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").expect("write");
        let store = FileStore::new(&path);
        let err = store.get("a").unwrap_err();
        assert!(err.to_string().contains("failed to parse storage"));
    }

    #[test]
    fn file_store_set_replaces_corrupt_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("storage.json");
        fs::write(&path, "{not json").expect("write");

        let mut store = FileStore::new(&path);
        store.set("ocr_app_credits", "4").expect("set");
        assert_eq!(store.get("ocr_app_credits").expect("get").as_deref(), Some("4"));
    }
}
