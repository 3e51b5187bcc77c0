//! AES-GCM credential encryption and SHA-256 fingerprinting.
//!
//! Grounded on the corpus's own use of `sha2`/`hex` for stable, non-reversible identifiers
//! (`openibank-crypto`) and `hmac` for signed payloads (`openibank-auth`); AES-GCM is added here
//! for the one thing neither teacher module needed: authenticated encryption of data at rest.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use aes_gcm::aead::rand_core::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RelayError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// A plaintext bearer credential obtained from the upstream at OAuth completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub obtained_at: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub token_type: String,
    pub viewer_user_id: String,
    pub viewer_email: String,
    pub workspace_id: String,
}

/// Same shape as [`Credential`] but with both token fields replaced by base64 ciphertext,
/// sharing one 96-bit nonce (also base64, stored alongside).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCredential {
    pub access_token_ct: String,
    pub refresh_token_ct: Option<String>,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub obtained_at: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub token_type: String,
    pub viewer_user_id: String,
    pub viewer_email: String,
    pub workspace_id: String,
}

/// Symmetric credential encryption keyed off a single configured secret.
///
/// The secret is right-padded with zero bytes to 32 bytes, then truncated to 32 bytes, producing
/// a fixed-size AES-256-GCM key cached for the process lifetime.
pub struct EnvelopeCrypto {
    cipher: Aes256Gcm,
}

impl EnvelopeCrypto {
    pub fn new(secret: &str) -> Self {
        let mut key_bytes = [0u8; KEY_LEN];
        let secret_bytes = secret.as_bytes();
        let take = secret_bytes.len().min(KEY_LEN);
        key_bytes[..take].copy_from_slice(&secret_bytes[..take]);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt_credential(&self, cred: &Credential) -> Result<EncryptedCredential, RelayError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let access_token_ct = self
            .cipher
            .encrypt(nonce, cred.access_token.as_bytes())
            .map_err(|_| RelayError::CryptoCorrupt)?;

        let refresh_token_ct = cred
            .refresh_token
            .as_ref()
            .map(|rt| self.cipher.encrypt(nonce, rt.as_bytes()))
            .transpose()
            .map_err(|_| RelayError::CryptoCorrupt)?;

        Ok(EncryptedCredential {
            access_token_ct: BASE64.encode(access_token_ct),
            refresh_token_ct: refresh_token_ct.map(|ct| BASE64.encode(ct)),
            nonce: BASE64.encode(nonce_bytes),
            expires_at: cred.expires_at,
            obtained_at: cred.obtained_at,
            scopes: cred.scopes.clone(),
            token_type: cred.token_type.clone(),
            viewer_user_id: cred.viewer_user_id.clone(),
            viewer_email: cred.viewer_email.clone(),
            workspace_id: cred.workspace_id.clone(),
        })
    }

    pub fn decrypt_credential(&self, enc: &EncryptedCredential) -> Result<Credential, RelayError> {
        let nonce_bytes = BASE64
            .decode(&enc.nonce)
            .map_err(|_| RelayError::CryptoCorrupt)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let access_ct = BASE64
            .decode(&enc.access_token_ct)
            .map_err(|_| RelayError::CryptoCorrupt)?;
        let access_pt = self
            .cipher
            .decrypt(nonce, access_ct.as_ref())
            .map_err(|_| RelayError::CryptoCorrupt)?;
        let access_token =
            String::from_utf8(access_pt).map_err(|_| RelayError::CryptoCorrupt)?;

        let refresh_token = match &enc.refresh_token_ct {
            Some(ct_b64) => {
                let ct = BASE64.decode(ct_b64).map_err(|_| RelayError::CryptoCorrupt)?;
                let pt = self
                    .cipher
                    .decrypt(nonce, ct.as_ref())
                    .map_err(|_| RelayError::CryptoCorrupt)?;
                Some(String::from_utf8(pt).map_err(|_| RelayError::CryptoCorrupt)?)
            }
            None => None,
        };

        Ok(Credential {
            access_token,
            refresh_token,
            expires_at: enc.expires_at,
            obtained_at: enc.obtained_at,
            scopes: enc.scopes.clone(),
            token_type: enc.token_type.clone(),
            viewer_user_id: enc.viewer_user_id.clone(),
            viewer_email: enc.viewer_email.clone(),
            workspace_id: enc.workspace_id.clone(),
        })
    }

    /// Hex SHA-256, used to turn bearer strings into stable identifiers that never reveal the
    /// bearer itself.
    pub fn fingerprint(secret_string: &str) -> String {
        let digest = Sha256::digest(secret_string.as_bytes());
        hex::encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credential() -> Credential {
        let now = Utc::now();
        Credential {
            access_token: "lin_api_abc123".to_string(),
            refresh_token: Some("lin_refresh_xyz".to_string()),
            expires_at: now + chrono::Duration::hours(1),
            obtained_at: now,
            scopes: vec!["read".to_string(), "write".to_string()],
            token_type: "Bearer".to_string(),
            viewer_user_id: "user_1".to_string(),
            viewer_email: "a@example.com".to_string(),
            workspace_id: "W1".to_string(),
        }
    }

    #[test]
    fn decrypt_of_encrypt_is_identity() {
        let crypto = EnvelopeCrypto::new("a-configured-secret");
        let cred = sample_credential();
        let enc = crypto.encrypt_credential(&cred).unwrap();
        let dec = crypto.decrypt_credential(&enc).unwrap();
        assert_eq!(cred, dec);
    }

    #[test]
    fn tampered_ciphertext_is_crypto_corrupt() {
        let crypto = EnvelopeCrypto::new("a-configured-secret");
        let cred = sample_credential();
        let mut enc = crypto.encrypt_credential(&cred).unwrap();

        let mut bytes = BASE64.decode(&enc.access_token_ct).unwrap();
        bytes[0] ^= 0xFF;
        enc.access_token_ct = BASE64.encode(bytes);

        let result = crypto.decrypt_credential(&enc);
        assert!(matches!(result, Err(RelayError::CryptoCorrupt)));
    }

    #[test]
    fn fingerprint_is_stable_and_does_not_reveal_input() {
        let fp1 = EnvelopeCrypto::fingerprint("bearer-secret");
        let fp2 = EnvelopeCrypto::fingerprint("bearer-secret");
        assert_eq!(fp1, fp2);
        assert_ne!(fp1, "bearer-secret");
        assert_eq!(fp1.len(), 64);
    }

    #[test]
    fn short_secret_is_right_padded_not_rejected() {
        let crypto = EnvelopeCrypto::new("short");
        let cred = sample_credential();
        let enc = crypto.encrypt_credential(&cred).unwrap();
        assert_eq!(crypto.decrypt_credential(&enc).unwrap(), cred);
    }
}
