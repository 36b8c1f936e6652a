use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStorage, CachedResponse, StorageError};

type Store = HashMap<String, CachedResponse>;

/// Process-local cache storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    caches: RwLock<HashMap<String, Store>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, cache: &str) -> Result<(), StorageError> {
        self.caches
            .write()
            .await
            .entry(cache.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, cache: &str) -> Result<bool, StorageError> {
        Ok(self.caches.read().await.contains_key(cache))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, cache: &str) -> Result<bool, StorageError> {
        Ok(self.caches.write().await.remove(cache).is_some())
    }

    async fn put(&self, cache: &str, key: &str, entry: CachedResponse) -> Result<(), StorageError> {
        let mut caches = self.caches.write().await;
        let store = caches
            .get_mut(cache)
            .ok_or_else(|| StorageError::MissingCache(cache.to_string()))?;
        store.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, cache: &str, key: &str) -> Result<Option<CachedResponse>, StorageError> {
        Ok(self
            .caches
            .read()
            .await
            .get(cache)
            .and_then(|store| store.get(key))
            .cloned())
    }

    async fn entries(&self, cache: &str) -> Result<Vec<String>, StorageError> {
        let caches = self.caches.read().await;
        let mut keys: Vec<String> = caches
            .get(cache)
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }
}
