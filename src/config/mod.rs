mod basic;
mod oauth;

pub use basic::BasicConfig;
pub use oauth::{OauthConfig, TestConfig};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment: compiled defaults layered under an optional
/// `config.toml` file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub basic: BasicConfig,

    #[serde(default)]
    pub oauth: OauthConfig,

    #[serde(default)]
    pub test: TestConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Layers, lowest precedence first: compiled defaults, optional `config.toml`, then
    /// `EDGE_RELAY_`-prefixed environment variables (`EDGE_RELAY_OAUTH__CLIENT_ID` for
    /// `oauth.client_id`) so a deployment can override individual fields without a file.
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        };
        figment.merge(Env::prefixed("EDGE_RELAY_").split("__"))
    }

    /// Loads configuration by merging defaults and `config.toml` if present, without validating
    /// required fields. Used by library/test code, which may run against an insecure default.
    pub fn from_optional_toml() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml): {err}")
        })
    }

    /// Loads configuration and panics if any required OAuth/webhook/crypto field is missing.
    /// The binary entrypoint must call this rather than [`Config::from_optional_toml`].
    pub fn from_toml() -> Self {
        let cfg: Self = Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration from {DEFAULT_CONFIG_FILE}: {err}")
        });
        if !cfg.oauth.has_required_fields() {
            panic!(
                "oauth.client_id, oauth.client_secret, oauth.webhook_signing_secret and \
                 oauth.credential_encryption_key must all be set and non-empty"
            );
        }
        cfg
    }
}

/// Global, lazily-initialized configuration instance for library/test code.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_optional_toml);
