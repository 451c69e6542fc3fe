//! In-memory key-value store, used in tests and when no data dir is set

use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::KeyValueStore;

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().map_err(|_| anyhow!("key-value store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().map_err(|_| anyhow!("key-value store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().map_err(|_| anyhow!("key-value store lock poisoned"))?;
        values.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let values = self.values.read().map_err(|_| anyhow!("key-value store lock poisoned"))?;
        Ok(values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_prefix_scan_is_sorted() {
        let store = InMemoryKeyValueStore::new();
        store.set("p:b", "").unwrap();
        store.set("q:a", "").unwrap();
        store.set("p:a", "").unwrap();
        assert_eq!(store.keys_with_prefix("p:").unwrap(), vec!["p:a", "p:b"]);
    }
}
