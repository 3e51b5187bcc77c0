use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_store::KeyedStore;

use crate::error::RelayError;

const KEY_PREFIX: &str = "oauth:state:";
const STATE_TTL: Duration = Duration::from_secs(600);

/// Short-lived record issued at `/oauth/authorize` and consumed at `/oauth/callback`.
///
/// The PKCE verifier travels inside this record rather than a cookie: unlike a browser-hosted
/// OAuth client, the proxy has no cookie jar shared across the authorize/callback round trip
/// when the final hop is a CLI `callback=` URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthState {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub redirect_uri: String,
    pub pkce_verifier: String,
    pub final_callback: Option<String>,
}

pub struct AuthStateTable {
    store: Arc<dyn KeyedStore>,
}

impl AuthStateTable {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    fn key(state: &str) -> String {
        format!("{KEY_PREFIX}{state}")
    }

    pub fn new_state_id() -> String {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Persist a new record under the caller-chosen `id` (the same value embedded as the OAuth
    /// `state` parameter in the authorize URL, so the callback can look this record back up).
    pub async fn issue(
        &self,
        id: String,
        redirect_uri: String,
        pkce_verifier: String,
        final_callback: Option<String>,
    ) -> Result<AuthState, RelayError> {
        let state = AuthState {
            id,
            created_at: Utc::now(),
            redirect_uri,
            pkce_verifier,
            final_callback,
        };
        let payload = serde_json::to_vec(&state)?;
        self.store
            .put(&Self::key(&state.id), payload, Some(STATE_TTL))
            .await?;
        Ok(state)
    }

    /// Look up and atomically consume `state`. Backed by `KeyedStore::take` rather than a
    /// `get` followed by a `delete`, so two callback requests racing on the same `state` (a
    /// provider retrying its redirect, or a user double-clicking) can never both succeed —
    /// exactly one observes the record, the other sees it already gone.
    pub async fn consume(&self, state: &str) -> Result<AuthState, RelayError> {
        let key = Self::key(state);
        let raw = self.store.take(&key).await?.ok_or(RelayError::StateExpired)?;
        let parsed: AuthState = serde_json::from_slice(&raw)?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;

    fn table() -> AuthStateTable {
        AuthStateTable::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn consume_is_at_most_once() {
        let table = table();
        let issued = table
            .issue(
                AuthStateTable::new_state_id(),
                "https://example.com/cb".to_string(),
                "verifier".to_string(),
                None,
            )
            .await
            .unwrap();

        let first = table.consume(&issued.id).await;
        let second = table.consume(&issued.id).await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(RelayError::StateExpired)));
    }

    /// Two callbacks racing on the same `state`, exercised as genuinely concurrent tasks rather
    /// than sequential calls, since a sequential `consume`-twice test can pass even with a
    /// non-atomic get-then-delete: the race only shows up when both reads can land before
    /// either delete does.
    #[tokio::test]
    async fn concurrent_consume_of_the_same_state_succeeds_exactly_once() {
        let table = Arc::new(table());
        let issued = table
            .issue(
                AuthStateTable::new_state_id(),
                "https://example.com/cb".to_string(),
                "verifier".to_string(),
                None,
            )
            .await
            .unwrap();

        let a = {
            let table = table.clone();
            let id = issued.id.clone();
            tokio::spawn(async move { table.consume(&id).await })
        };
        let b = {
            let table = table.clone();
            let id = issued.id.clone();
            tokio::spawn(async move { table.consume(&id).await })
        };

        let (first, second) = tokio::join!(a, b);
        let outcomes = [first.unwrap(), second.unwrap()];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "exactly one concurrent consume must succeed");
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(RelayError::StateExpired))));
    }

    #[tokio::test]
    async fn absent_state_is_indistinguishable_from_expired() {
        let table = table();
        let result = table.consume("never-issued").await;
        assert!(matches!(result, Err(RelayError::StateExpired)));
    }
}
