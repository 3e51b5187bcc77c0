use crate::{KeyedStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// In-process `KeyedStore` backed by a concurrent cache.
///
/// Per-key TTL is tracked alongside the value rather than via moka's global
/// `time_to_live`, since different key prefixes (auth state, credentials, edge
/// connections) need independent expirations on the same cache.
pub struct MemoryStore {
    cache: Cache<String, Entry>,
    // moka's `Cache` has no atomic remove-and-return-previous; this guard serializes `take`
    // against itself so two concurrent takes of the same key can't both see it present.
    take_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().max_capacity(100_000).build(),
            take_lock: Mutex::new(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        self.cache.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.cache.get(key) {
            Some(entry) if entry.is_expired() => {
                self.cache.invalidate(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let _guard = self.take_lock.lock().unwrap();
        let found = match self.cache.get(key) {
            Some(entry) if entry.is_expired() => None,
            Some(entry) => Some(entry.value),
            None => None,
        };
        self.cache.invalidate(key);
        Ok(found)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for (key, entry) in self.cache.iter() {
            if !key.starts_with(prefix) {
                continue;
            }
            if entry.is_expired() {
                self.cache.invalidate(&*key);
                continue;
            }
            keys.push((*key).clone());
        }
        Ok(keys)
    }
}
