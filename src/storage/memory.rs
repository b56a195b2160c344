use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::StorageResult;

/// In-memory key-value store.
///
/// Backed by a sorted map so `keys` comes back in lexicographic order
/// without extra work.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Copy of every record, for inspection in tests and tooling.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.records
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .records
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_overwrite() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_keys_prefix_sorted() {
        let store = MemoryStore::new();
        for key in ["ns:b", "other:a", "ns:a", "ns:a:backup", "nt:z"] {
            store.set(key, "{}").await.unwrap();
        }

        let keys = store.keys("ns:").await.unwrap();
        assert_eq!(keys, vec!["ns:a", "ns:a:backup", "ns:b"]);

        let all = store.keys("").await.unwrap();
        assert_eq!(all.len(), 5);
    }
}
