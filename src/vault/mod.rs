//! Wraps [`EnvelopeCrypto`] and [`KeyedStore`] at the `oauth:token:<workspace>` prefix.
//!
//! Grounded on `CredentialVault`'s role being exactly what `google_oauth`/`service/credential_*`
//! played in the teacher repo — the one place a credential's plaintext and ciphertext forms meet
//! — but rebuilt on a generic `KeyedStore` instead of a ractor-backed SQLite actor directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_store::KeyedStore;
use tracing::{info, warn};

use crate::crypto::{Credential, EncryptedCredential, EnvelopeCrypto};
use crate::error::RelayError;

const KEY_PREFIX: &str = "oauth:token:";

pub struct CredentialVault {
    store: Arc<dyn KeyedStore>,
    crypto: Arc<EnvelopeCrypto>,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn KeyedStore>, crypto: Arc<EnvelopeCrypto>) -> Self {
        Self { store, crypto }
    }

    fn key(workspace_id: &str) -> String {
        format!("{KEY_PREFIX}{workspace_id}")
    }

    /// Encrypt and persist `cred`, with TTL `max(1, (expiry - now)/1s)`.
    pub async fn save(&self, cred: &Credential) -> Result<(), RelayError> {
        let encrypted = self.crypto.encrypt_credential(cred)?;
        let ttl_secs = (cred.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let payload = serde_json::to_vec(&encrypted)?;
        self.store
            .put(&Self::key(&cred.workspace_id), payload, Some(Duration::from_secs(ttl_secs)))
            .await?;
        info!(workspace_id = %cred.workspace_id, ttl_secs, "credential saved to vault");
        Ok(())
    }

    /// Decrypt the stored credential for `workspace_id`. A corrupt record is treated as absent
    /// and deleted (self-healing).
    pub async fn get(&self, workspace_id: &str) -> Result<Option<Credential>, RelayError> {
        let Some(raw) = self.store.get(&Self::key(workspace_id)).await? else {
            return Ok(None);
        };
        let encrypted: EncryptedCredential = serde_json::from_slice(&raw)?;
        match self.crypto.decrypt_credential(&encrypted) {
            Ok(cred) => Ok(Some(cred)),
            Err(RelayError::CryptoCorrupt) => {
                warn!(workspace_id, "credential record failed decryption; deleting");
                self.store.delete(&Self::key(workspace_id)).await?;
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// Declared but unimplemented: the upstream in scope here has no documented refresh-token
    /// grant, so an expired credential is evicted rather than silently refreshed.
    pub async fn refresh(&self, _workspace_id: &str) -> Result<Credential, RelayError> {
        Err(RelayError::RefreshNotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;

    fn sample(workspace_id: &str) -> Credential {
        let now = Utc::now();
        Credential {
            access_token: "lin_api_abc".to_string(),
            refresh_token: None,
            expires_at: now + chrono::Duration::hours(1),
            obtained_at: now,
            scopes: vec!["read".to_string()],
            token_type: "Bearer".to_string(),
            viewer_user_id: "u1".to_string(),
            viewer_email: "u1@example.com".to_string(),
            workspace_id: workspace_id.to_string(),
        }
    }

    fn vault() -> CredentialVault {
        CredentialVault::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EnvelopeCrypto::new("test-secret")),
        )
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let vault = vault();
        let cred = sample("W1");
        vault.save(&cred).await.unwrap();
        let fetched = vault.get("W1").await.unwrap();
        assert_eq!(fetched, Some(cred));
    }

    #[tokio::test]
    async fn absent_workspace_returns_none() {
        let vault = vault();
        assert_eq!(vault.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupted_record_self_heals_to_absent() {
        let vault = vault();
        let cred = sample("W1");
        vault.save(&cred).await.unwrap();

        let key = CredentialVault::key("W1");
        let raw = vault.store.get(&key).await.unwrap().unwrap();
        let mut encrypted: crate::crypto::EncryptedCredential =
            serde_json::from_slice(&raw).unwrap();
        encrypted.access_token_ct = "not-valid-ciphertext-but-valid-base64".to_string();
        vault
            .store
            .put(&key, serde_json::to_vec(&encrypted).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(vault.get("W1").await.unwrap(), None);
        assert_eq!(vault.store.get(&key).await.unwrap(), None);
        assert_eq!(vault.get("W1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn refresh_is_not_implemented() {
        let vault = vault();
        assert!(matches!(
            vault.refresh("W1").await,
            Err(RelayError::RefreshNotImplemented)
        ));
    }
}
