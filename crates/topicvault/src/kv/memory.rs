use super::KeyValueStore;
use crate::error::{Result, TopicVaultError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

type Tables = HashMap<String, BTreeMap<String, Value>>;

/// In-memory key/value store.
///
/// Besides backing tests, this is what a host without persistent storage gets.
/// `fail_puts_after` lets tests make the N+1th write fail to exercise rollback paths.
#[derive(Default)]
pub struct MemKv {
    tables: Mutex<Tables>,
    fault: Mutex<Option<WriteFault>>,
}

#[derive(Debug, Clone, Copy)]
enum WriteFault {
    Always,
    /// This many more successes, one failure, then healthy again.
    After(usize),
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `n` more successful `put`s, fail the next one, then recover.
    pub fn fail_puts_after(&self, n: usize) {
        if let Ok(mut fault) = self.fault.lock() {
            *fault = Some(WriteFault::After(n));
        }
    }

    /// Fail every write until switched off.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        if let Ok(mut fault) = self.fault.lock() {
            *fault = simulate.then_some(WriteFault::Always);
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| TopicVaultError::Store("key/value lock poisoned".to_string()))
    }

    fn check_write_budget(&self) -> Result<()> {
        let mut fault = self
            .fault
            .lock()
            .map_err(|_| TopicVaultError::Store("key/value lock poisoned".to_string()))?;
        match *fault {
            None => Ok(()),
            Some(WriteFault::Always) => Err(simulated()),
            Some(WriteFault::After(0)) => {
                *fault = None;
                Err(simulated())
            }
            Some(WriteFault::After(n)) => {
                *fault = Some(WriteFault::After(n - 1));
                Ok(())
            }
        }
    }
}

fn simulated() -> TopicVaultError {
    TopicVaultError::Store("Simulated write error".to_string())
}

impl KeyValueStore for MemKv {
    fn get(&self, table: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .tables()?
            .get(table)
            .and_then(|t| t.get(key))
            .cloned())
    }

    fn put(&self, table: &str, key: &str, value: Value) -> Result<()> {
        self.check_write_budget()?;
        self.tables()?
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, table: &str, key: &str) -> Result<()> {
        if let Some(t) = self.tables()?.get_mut(table) {
            t.remove(key);
        }
        Ok(())
    }

    fn keys(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .tables()?
            .get(table)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn entries(&self, table: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .tables()?
            .get(table)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn clear(&self) -> Result<()> {
        self.tables()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KeyValueExt;
    use serde_json::json;

    #[test]
    fn test_put_get_delete() {
        let kv = MemKv::new();
        kv.put("t", "a", json!(1)).unwrap();
        assert_eq!(kv.get("t", "a").unwrap(), Some(json!(1)));
        assert_eq!(kv.get("other", "a").unwrap(), None);
        kv.delete("t", "a").unwrap();
        kv.delete("t", "a").unwrap();
        assert_eq!(kv.get("t", "a").unwrap(), None);
    }

    #[test]
    fn test_keys_sorted_and_prefix_scan() {
        let kv = MemKv::new();
        for key in ["topics/b/x.md", "topics/a/y.md", "topics/a/z.md"] {
            kv.put("files", key, json!("")).unwrap();
        }
        assert_eq!(
            kv.keys("files").unwrap(),
            vec!["topics/a/y.md", "topics/a/z.md", "topics/b/x.md"]
        );
        assert_eq!(
            kv.keys_with_prefix("files", "topics/a/").unwrap(),
            vec!["topics/a/y.md", "topics/a/z.md"]
        );
    }

    #[test]
    fn test_fail_puts_after_budget() {
        let kv = MemKv::new();
        kv.fail_puts_after(2);
        kv.put("t", "1", json!(1)).unwrap();
        kv.put("t", "2", json!(2)).unwrap();
        assert!(kv.put("t", "3", json!(3)).is_err());
        kv.delete("t", "1").unwrap();
        kv.put("t", "3", json!(3)).unwrap();
    }

    #[test]
    fn test_simulated_write_error_is_sticky() {
        let kv = MemKv::new();
        kv.set_simulate_write_error(true);
        assert!(kv.put("t", "a", json!(1)).is_err());
        assert!(kv.put("t", "a", json!(1)).is_err());
        kv.set_simulate_write_error(false);
        kv.put("t", "a", json!(1)).unwrap();
    }

    #[test]
    fn test_typed_access() {
        let kv = MemKv::new();
        kv.put_as("t", "k", &vec!["a".to_string()]).unwrap();
        let back: Option<Vec<String>> = kv.get_as("t", "k").unwrap();
        assert_eq!(back, Some(vec!["a".to_string()]));
    }
}
