//! Abstract key/value store with TTL, shared by every stateful component of the proxy.
//!
//! Higher components (the credential vault, the routing table, the OAuth state table) only ever
//! speak the [`KeyedStore`] trait, so an in-process [`MemoryStore`] and a durable
//! [`SqliteStore`] are interchangeable — the former for tests and small deployments, the latter
//! for anything that must survive a restart.

mod memory;
mod sqlite;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error as ThisError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("store backend unreachable: {0}")]
    Unavailable(String),
}

/// Capability-based persistence: anything with `put/get/delete/take/list` can back the proxy's
/// state.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Write `value` under `key`. `ttl` of `None` means "never expires".
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Read the value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically read and remove `key`, returning the value that was there or `None` if the key
    /// was absent or expired. Unlike a `get` followed by a `delete`, two concurrent `take`s on the
    /// same key can never both observe the value present — exactly one wins.
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// List every live key starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn ttl_honoured_within_a_second<S: KeyedStore>(store: S) {
        store
            .put("oauth:state:abc", b"hello".to_vec(), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(
            store.get("oauth:state:abc").await.unwrap(),
            Some(b"hello".to_vec())
        );
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get("oauth:state:abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_honours_ttl() {
        ttl_honoured_within_a_second(MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn memory_store_list_respects_prefix() {
        let store = MemoryStore::new();
        store.put("edge:connection:a", b"1".to_vec(), None).await.unwrap();
        store.put("edge:connection:b", b"2".to_vec(), None).await.unwrap();
        store.put("oauth:state:c", b"3".to_vec(), None).await.unwrap();

        let mut keys = store.list("edge:connection:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["edge:connection:a", "edge:connection:b"]);
    }

    #[tokio::test]
    async fn memory_store_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.delete("never:written").await.unwrap();
        store.put("k", b"v".to_vec(), None).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    async fn take_is_at_most_once<S: KeyedStore + 'static>(store: Arc<S>) {
        store.put("oauth:state:race", b"payload".to_vec(), None).await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.take("oauth:state:race").await.unwrap() })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.take("oauth:state:race").await.unwrap() })
        };

        let (first, second) = tokio::join!(a, b);
        let results = [first.unwrap(), second.unwrap()];
        let wins = results.iter().filter(|r| r.is_some()).count();
        assert_eq!(wins, 1, "exactly one concurrent take must observe the value");
        assert_eq!(store.get("oauth:state:race").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_take_is_at_most_once_under_concurrency() {
        take_is_at_most_once(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn memory_store_take_on_absent_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.take("never:written").await.unwrap(), None);
    }
}
