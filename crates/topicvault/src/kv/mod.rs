//! # Key/Value Layer
//!
//! Several parts of the system need a small persistent database of JSON values,
//! grouped into named tables:
//!
//! - the virtual filesystem ([`crate::store::virtual_db`]): `topics`, `files`, `directories`
//! - the linked-folder registry ([`crate::store::registry`]): `linked_folders`
//! - the archive adapter's reload cache ([`crate::store::archive`]): `cache`
//!
//! [`KeyValueStore`] is the raw I/O surface; [`KeyValueExt`] layers typed access on
//! top of it for any implementation, including `dyn KeyValueStore`.
//!
//! ## Implementations
//!
//! - [`fs::JsonFileKv`]: one pretty-printed JSON file per table, written atomically.
//! - [`memory::MemKv`]: in-process maps, with write-failure injection for tests.
//!
//! Keys within a table iterate in lexicographic order in both implementations.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub mod fs;
pub mod memory;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, table: &str, key: &str) -> Result<Option<Value>>;

    /// Insert or overwrite.
    fn put(&self, table: &str, key: &str, value: Value) -> Result<()>;

    /// Removing a missing key is not an error.
    fn delete(&self, table: &str, key: &str) -> Result<()>;

    /// All keys of `table`, sorted.
    fn keys(&self, table: &str) -> Result<Vec<String>>;

    /// All entries of `table`, sorted by key.
    fn entries(&self, table: &str) -> Result<Vec<(String, Value)>>;

    /// Drops every table.
    fn clear(&self) -> Result<()>;
}

/// Typed helpers over any [`KeyValueStore`].
pub trait KeyValueExt: KeyValueStore {
    fn get_as<T: DeserializeOwned>(&self, table: &str, key: &str) -> Result<Option<T>> {
        match self.get(table, key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn put_as<T: Serialize>(&self, table: &str, key: &str, value: &T) -> Result<()> {
        self.put(table, key, serde_json::to_value(value)?)
    }

    /// Keys of `table` starting with `prefix`.
    fn keys_with_prefix(&self, table: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys(table)?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueExt for S {}
