//! Device-local key-value storage.
//!
//! Values are opaque strings. `FileStore` keeps one file per key and replaces
//! it atomically: the value is written to a uniquely named temporary file in
//! the same directory, synced, then renamed over the target.

use crate::error::StorageError;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

pub const TASKS_KEY: &str = "@todolab:tasks";
pub const CHAT_HISTORY_KEY: &str = "@todolab:chat_history";
pub const SETTINGS_KEY: &str = "@todolab:settings";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `@todolab:chat_history` -> `<dir>/todolab_chat_history.json`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let stem: String = key
            .trim_start_matches('@')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", stem))
    }

    /// Each write gets its own temp file, so concurrent writers to one key
    /// never share one; the last rename wins.
    fn write_atomic(&self, path: &Path, value: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp_file = NamedTempFile::new_in(&self.dir)?;
        tmp_file.write_all(value.as_bytes())?;
        tmp_file.as_file().sync_all()?;
        tmp_file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                key: key.to_string(),
                path,
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        self.write_atomic(&path, value)
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                path,
                source,
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_path_for_sanitizes_key() {
        let store = FileStore::new("/data");
        assert_eq!(
            store.path_for(CHAT_HISTORY_KEY),
            PathBuf::from("/data/todolab_chat_history.json")
        );
    }

    #[test]
    fn test_file_store_set_get_overwrite() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.get(TASKS_KEY).unwrap(), None);
        store.set(TASKS_KEY, "[1,2]").unwrap();
        assert_eq!(store.get(TASKS_KEY).unwrap().as_deref(), Some("[1,2]"));

        store.set(TASKS_KEY, "[]").unwrap();
        assert_eq!(store.get(TASKS_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_file_store_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.set(SETTINGS_KEY, "{}").unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["todolab_settings.json".to_string()]);
    }

    #[test]
    fn test_concurrent_writers_to_one_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let handles: Vec<_> = (0..4)
            .map(|writer| {
                let store = store.clone();
                std::thread::spawn(move || -> Result<(), StorageError> {
                    for round in 0..50 {
                        store.set(TASKS_KEY, &format!("[{},{}]", writer, round))?;
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let value = store.get(TASKS_KEY).unwrap().unwrap();
        assert!(value.ends_with(",49]"), "unexpected final value {}", value);
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["todolab_tasks.json".to_string()]);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
