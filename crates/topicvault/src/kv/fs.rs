use super::KeyValueStore;
use crate::error::{Result, TopicVaultError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// File-backed key/value store.
///
/// ```text
/// {dir}/
/// ├── topics.json        # {"climate-change": {...}, ...}
/// ├── files.json
/// └── directories.json
/// ```
///
/// Each table is loaded, modified and rewritten whole on every write.
pub struct JsonFileKv {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileKv {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| TopicVaultError::Store("key/value lock poisoned".to_string()))
    }

    fn table_path(&self, table: &str) -> Result<PathBuf> {
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(TopicVaultError::Store(format!("invalid table name: {}", table)));
        }
        Ok(self.dir.join(format!("{}.json", table)))
    }

    fn load_table(&self, table: &str) -> Result<BTreeMap<String, Value>> {
        let path = self.table_path(table)?;
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path).map_err(TopicVaultError::Io)?;
        let map = serde_json::from_str(&content).map_err(TopicVaultError::Serialization)?;
        Ok(map)
    }

    fn save_table(&self, table: &str, map: &BTreeMap<String, Value>) -> Result<()> {
        let path = self.table_path(table)?;
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(TopicVaultError::Io)?;
        }
        let content = serde_json::to_string_pretty(map).map_err(TopicVaultError::Serialization)?;

        // Atomic write
        let tmp = self.dir.join(format!(".{}-{}.tmp", table, Uuid::new_v4()));
        fs::write(&tmp, content).map_err(TopicVaultError::Io)?;
        fs::rename(&tmp, path).map_err(TopicVaultError::Io)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileKv {
    fn get(&self, table: &str, key: &str) -> Result<Option<Value>> {
        let _guard = self.guard()?;
        Ok(self.load_table(table)?.remove(key))
    }

    fn put(&self, table: &str, key: &str, value: Value) -> Result<()> {
        let _guard = self.guard()?;
        let mut map = self.load_table(table)?;
        map.insert(key.to_string(), value);
        self.save_table(table, &map)
    }

    fn delete(&self, table: &str, key: &str) -> Result<()> {
        let _guard = self.guard()?;
        let mut map = self.load_table(table)?;
        if map.remove(key).is_some() {
            self.save_table(table, &map)?;
        }
        Ok(())
    }

    fn keys(&self, table: &str) -> Result<Vec<String>> {
        let _guard = self.guard()?;
        Ok(self.load_table(table)?.into_keys().collect())
    }

    fn entries(&self, table: &str) -> Result<Vec<(String, Value)>> {
        let _guard = self.guard()?;
        Ok(self.load_table(table)?.into_iter().collect())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.guard()?;
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.dir).map_err(TopicVaultError::Io)? {
            let path = entry.map_err(TopicVaultError::Io)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(path).map_err(TopicVaultError::Io)?;
            }
        }
        Ok(())
    }
}
