//! Storage trait definitions

use anyhow::Result;

/// String key-value storage for client preferences
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace the value under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, sorted
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}
