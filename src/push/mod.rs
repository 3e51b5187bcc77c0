//! Alternate delivery mode for edges that can accept inbound HTTP instead of holding a stream
//! open: signs each envelope with the edge's own HMAC secret and posts it, with bounded retry
//! and a per-edge token-bucket rate limit.
//!
//! Grounded on the teacher's `providers/upstream_retry.rs` (`post_json_with_retry`, the
//! closure-retried-with-backon shape) for the retry loop, and on `openibank-auth`'s HMAC-signed
//! request pattern for the signature header scheme.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use hmac::{Hmac, Mac};
use relay_schema::Envelope;
use relay_store::KeyedStore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::error::RelayError;

const KEY_PREFIX: &str = "edge:worker:";
const EDGE_TTL: Duration = Duration::from_secs(90 * 24 * 3600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const USER_AGENT: &str = "edge-relay-push/1";

type HmacSha256 = Hmac<Sha256>;
type EdgeRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// An edge registered for push-mode delivery via `POST /edges/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredEdge {
    pub edge_id: String,
    pub target_url: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub workspaces: Vec<String>,
    pub secret: String,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub last_seen_at: chrono::DateTime<chrono::Utc>,
}

pub struct PushSender {
    store: Arc<dyn KeyedStore>,
    http_client: reqwest::Client,
    limiters: Mutex<std::collections::HashMap<String, Arc<EdgeRateLimiter>>>,
}

impl PushSender {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("valid reqwest client");
        Self {
            store,
            http_client,
            limiters: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn key(edge_id: &str) -> String {
        format!("{KEY_PREFIX}{edge_id}")
    }

    pub async fn register(
        &self,
        target_url: String,
        name: String,
        capabilities: Vec<String>,
        workspaces: Vec<String>,
    ) -> Result<RegisteredEdge, RelayError> {
        let edge_id = uuid::Uuid::new_v4().to_string();
        let secret = generate_secret();
        let now = chrono::Utc::now();
        let edge = RegisteredEdge {
            edge_id: edge_id.clone(),
            target_url,
            name,
            capabilities,
            workspaces,
            secret,
            registered_at: now,
            last_seen_at: now,
        };
        let payload = serde_json::to_vec(&edge)?;
        self.store
            .put(&Self::key(&edge_id), payload, Some(EDGE_TTL))
            .await?;
        Ok(edge)
    }

    pub async fn get(&self, edge_id: &str) -> Result<Option<RegisteredEdge>, RelayError> {
        let Some(raw) = self.store.get(&Self::key(edge_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Sign and POST `envelope` to `edge`, retrying non-2xx responses and timeouts with
    /// `2^attempt` second backoff across attempts 0, 1, 2, then giving up.
    pub async fn send(&self, edge: &RegisteredEdge, envelope: &Envelope) -> Result<(), RelayError> {
        self.limiter_for(&edge.edge_id).await.until_ready().await;

        let body = serde_json::to_vec(envelope)?;
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = sign(&edge.secret, &timestamp, &body);

        for attempt in 0..MAX_ATTEMPTS {
            let result = self
                .http_client
                .post(&edge.target_url)
                .header("X-Webhook-Signature", format!("sha256={signature}"))
                .header("X-Webhook-Timestamp", &timestamp)
                .header("Content-Type", "application/json")
                .header("User-Agent", USER_AGENT)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    warn!(edge_id = %edge.edge_id, status = %resp.status(), attempt, "push delivery non-2xx");
                }
                Err(e) => {
                    warn!(edge_id = %edge.edge_id, error = %e, attempt, "push delivery request failed");
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
        }

        error!(edge_id = %edge.edge_id, "push delivery exhausted retries");
        Err(RelayError::PushDeliveryFailed(edge.edge_id.clone()))
    }

    async fn limiter_for(&self, edge_id: &str) -> Arc<EdgeRateLimiter> {
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(edge_id.to_string())
            .or_insert_with(|| {
                Arc::new(RateLimiter::direct(Quota::per_second(
                    NonZeroU32::new(10).expect("10 is non-zero"),
                )))
            })
            .clone()
    }
}

fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender() -> PushSender {
        PushSender::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn register_then_get_roundtrips() {
        let sender = sender();
        let edge = sender
            .register(
                "https://edge.example/hook".to_string(),
                "laptop".to_string(),
                vec!["push".to_string()],
                vec!["W1".to_string()],
            )
            .await
            .unwrap();

        let fetched = sender.get(&edge.edge_id).await.unwrap().unwrap();
        assert_eq!(fetched.edge_id, edge.edge_id);
        assert_eq!(fetched.secret, edge.secret);
    }

    #[tokio::test]
    async fn send_succeeds_on_first_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists("X-Webhook-Signature"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = sender();
        let edge = RegisteredEdge {
            edge_id: "e1".to_string(),
            target_url: format!("{}/hook", server.uri()),
            name: "test".to_string(),
            capabilities: vec![],
            workspaces: vec!["W1".to_string()],
            secret: "edge-secret".to_string(),
            registered_at: chrono::Utc::now(),
            last_seen_at: chrono::Utc::now(),
        };

        let envelope = Envelope::heartbeat();
        sender.send(&edge, &envelope).await.unwrap();
    }

    #[tokio::test]
    async fn send_retries_then_gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let sender = sender();
        let edge = RegisteredEdge {
            edge_id: "e2".to_string(),
            target_url: format!("{}/hook", server.uri()),
            name: "test".to_string(),
            capabilities: vec![],
            workspaces: vec!["W1".to_string()],
            secret: "edge-secret".to_string(),
            registered_at: chrono::Utc::now(),
            last_seen_at: chrono::Utc::now(),
        };

        let envelope = Envelope::heartbeat();
        let result = sender.send(&edge, &envelope).await;
        assert!(matches!(result, Err(RelayError::PushDeliveryFailed(_))));
    }
}
