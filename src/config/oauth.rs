use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Upstream OAuth/webhook/crypto configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OauthConfig {
    /// Upstream OAuth app client id.
    /// TOML: `oauth.client_id`. Must be provided.
    #[serde(default)]
    pub client_id: String,

    /// Upstream OAuth app client secret.
    /// TOML: `oauth.client_secret`. Must be provided.
    #[serde(default, deserialize_with = "deserialize_string_lax")]
    pub client_secret: String,

    /// Redirect URI registered with the upstream OAuth app.
    /// TOML: `oauth.redirect_uri`. Must be provided.
    #[serde(default)]
    pub redirect_uri: String,

    /// Secret used to verify `linear-signature` webhook headers.
    /// TOML: `oauth.webhook_signing_secret`. Must be provided.
    #[serde(default, deserialize_with = "deserialize_string_lax")]
    pub webhook_signing_secret: String,

    /// Secret the credential vault pads/truncates into a 32-byte AES-256-GCM key.
    /// TOML: `oauth.credential_encryption_key`. Must be provided.
    #[serde(default, deserialize_with = "deserialize_string_lax")]
    pub credential_encryption_key: String,
}

impl Default for OauthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            webhook_signing_secret: String::new(),
            credential_encryption_key: String::new(),
        }
    }
}

impl OauthConfig {
    pub fn has_required_fields(&self) -> bool {
        !self.client_id.trim().is_empty()
            && !self.client_secret.trim().is_empty()
            && !self.webhook_signing_secret.trim().is_empty()
            && !self.credential_encryption_key.trim().is_empty()
    }
}

fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected a string or a number")),
    }
}

/// Test-only knobs consumed by `StreamRegistry` so test harnesses can exercise disconnect
/// handling without relying on real client socket drops.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct TestConfig {
    /// When set, every stream connection is forced to disconnect `disconnect_after_ms` after
    /// attach, by casting a `Disconnect` to its hub actor on a delayed task.
    #[serde(default)]
    pub simulate_disconnect: bool,

    #[serde(default)]
    pub disconnect_after_ms: u64,
}
