//! Per-edge streaming hub: one [`ractor`] actor per bearer fingerprint, fanning out envelopes to
//! every concurrent `GET /events/stream` connection for that edge.
//!
//! Grounded on the teacher's `db/actor.rs` (the `Actor` + `ActorRef` + reply-port handle wrapper
//! shape) and `providers/codex/manager/actor.rs` (background `tokio::spawn` work kicked off from
//! inside a `cast` handler) — generalized from a single global actor guarding a SQLite pool to
//! many short-lived actors, one per connected edge, each owning its own heartbeat ticker.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use relay_schema::Envelope;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::TestConfig;
use crate::error::RelayError;
use crate::routing::RoutingTable;

const CHANNEL_CAPACITY: usize = 64;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum StreamHubMessage {
    Connect(RpcReplyPort<(u64, mpsc::Receiver<String>)>),
    Disconnect(u64),
    SendEnvelope(Envelope),
    HeartbeatTick,
    Drain,
}

pub struct StreamHubState {
    fingerprint: String,
    routing: Arc<RoutingTable>,
    connections: HashMap<u64, mpsc::Sender<String>>,
    next_connection_id: u64,
    ticker: Option<JoinHandle<()>>,
}

pub struct StreamHubActor;

#[ractor::async_trait]
impl Actor for StreamHubActor {
    type Msg = StreamHubMessage;
    type State = StreamHubState;
    type Arguments = (String, Arc<RoutingTable>);

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        (fingerprint, routing): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let ticker_handle = myself.clone();
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                if ticker_handle.cast(StreamHubMessage::HeartbeatTick).is_err() {
                    break;
                }
            }
        });

        Ok(StreamHubState {
            fingerprint,
            routing,
            connections: HashMap::new(),
            next_connection_id: 0,
            ticker: Some(ticker),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            StreamHubMessage::Connect(reply) => {
                let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
                let id = state.next_connection_id;
                state.next_connection_id += 1;

                if let Ok(line) = Envelope::connection("connected").to_ndjson_line() {
                    let _ = tx.try_send(line);
                }
                state.connections.insert(id, tx);
                let _ = reply.send((id, rx));
            }
            StreamHubMessage::Disconnect(id) => {
                state.connections.remove(&id);
                if state.connections.is_empty() {
                    let _ = myself.stop(None);
                }
            }
            StreamHubMessage::SendEnvelope(envelope) => {
                let line = envelope.to_ndjson_line().map_err(|e| {
                    ActorProcessingErr::from(format!("envelope serialization failed: {e}"))
                })?;
                self.broadcast(&myself, state, &line);
            }
            StreamHubMessage::HeartbeatTick => {
                if let Err(e) = state.routing.heartbeat(&state.fingerprint).await {
                    warn!(fingerprint = %state.fingerprint, error = %e, "routing heartbeat failed");
                }
                if let Ok(line) = Envelope::heartbeat().to_ndjson_line() {
                    self.broadcast(&myself, state, &line);
                }
            }
            StreamHubMessage::Drain => {
                if let Ok(line) = Envelope::connection("draining").to_ndjson_line() {
                    self.broadcast(&myself, state, &line);
                }
                let _ = myself.stop(None);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        if let Err(e) = state.routing.detach(&state.fingerprint).await {
            warn!(fingerprint = %state.fingerprint, error = %e, "routing detach on stream close failed");
        }
        info!(fingerprint = %state.fingerprint, "stream hub stopped");
        Ok(())
    }
}

impl StreamHubActor {
    /// Write `line` to every live connection; connections whose receiver has gone away (dropped
    /// body, write failure surfaced as a closed channel) are pruned rather than retried.
    fn broadcast(&self, myself: &ActorRef<StreamHubMessage>, state: &mut StreamHubState, line: &str) {
        let mut dead = Vec::new();
        for (id, tx) in &state.connections {
            if tx.try_send(line.to_string()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            state.connections.remove(&id);
        }
        if state.connections.is_empty() {
            let _ = myself.stop(None);
        }
    }
}

/// A connected edge's NDJSON line stream. Casts `Disconnect` to its hub the moment it is
/// dropped — when the handler's `Body::from_stream` future is cancelled by a client socket
/// close — so the hub prunes the connection immediately instead of waiting for the next
/// broadcast's failed `try_send` to notice.
pub struct EdgeStream {
    rx: mpsc::Receiver<String>,
    connection_id: u64,
    hub: ActorRef<StreamHubMessage>,
}

impl EdgeStream {
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for EdgeStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EdgeStream {
    fn drop(&mut self) {
        let _ = self.hub.cast(StreamHubMessage::Disconnect(self.connection_id));
    }
}

/// Looks up or spawns the per-edge actor for a bearer's fingerprint and exposes the handful of
/// operations the server routes and the dispatcher need.
#[derive(Clone)]
pub struct StreamRegistry {
    routing: Arc<RoutingTable>,
    actors: Arc<Mutex<HashMap<String, ActorRef<StreamHubMessage>>>>,
    test: TestConfig,
}

impl StreamRegistry {
    pub fn new(routing: Arc<RoutingTable>) -> Self {
        Self::with_test_config(routing, TestConfig::default())
    }

    /// Same as [`StreamRegistry::new`], but lets a test harness force connections to disconnect
    /// after a fixed delay instead of relying on real client socket drops.
    pub fn with_test_config(routing: Arc<RoutingTable>, test: TestConfig) -> Self {
        Self {
            routing,
            actors: Arc::new(Mutex::new(HashMap::new())),
            test,
        }
    }

    /// Attach a new NDJSON stream connection for `bearer`. Registers the edge in the routing
    /// table on first connect; subsequent connects for the same bearer share the existing hub.
    pub async fn connect(
        &self,
        bearer: &str,
        workspaces: std::collections::BTreeSet<String>,
    ) -> Result<EdgeStream, RelayError> {
        let fingerprint = RoutingTable::fingerprint_of(bearer);
        let actor_ref = self.actor_for(&fingerprint, bearer, workspaces).await?;

        let (id, rx) = ractor::call!(actor_ref, StreamHubMessage::Connect)
            .map_err(|e| RelayError::StreamWriteFailed(format!("hub unreachable: {e}")))?;

        if self.test.simulate_disconnect {
            let actor_ref = actor_ref.clone();
            let delay = Duration::from_millis(self.test.disconnect_after_ms);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = actor_ref.cast(StreamHubMessage::Disconnect(id));
            });
        }

        Ok(EdgeStream { rx, connection_id: id, hub: actor_ref })
    }

    pub async fn send(&self, fingerprint: &str, envelope: Envelope) -> Result<(), RelayError> {
        let actors = self.actors.lock().await;
        if let Some(actor_ref) = actors.get(fingerprint) {
            actor_ref
                .cast(StreamHubMessage::SendEnvelope(envelope))
                .map_err(|e| RelayError::StreamWriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Signal every active hub to emit a `draining` envelope and close, for graceful shutdown.
    pub async fn drain_all(&self) {
        let actors = self.actors.lock().await;
        for actor_ref in actors.values() {
            let _ = actor_ref.cast(StreamHubMessage::Drain);
        }
    }

    async fn actor_for(
        &self,
        fingerprint: &str,
        bearer: &str,
        workspaces: std::collections::BTreeSet<String>,
    ) -> Result<ActorRef<StreamHubMessage>, RelayError> {
        let mut actors = self.actors.lock().await;
        if let Some(existing) = actors.get(fingerprint) {
            if matches!(existing.get_status(), ractor::ActorStatus::Running) {
                return Ok(existing.clone());
            }
        }

        self.routing.attach(bearer.to_string(), workspaces).await?;
        let (actor_ref, _join) = Actor::spawn(
            None,
            StreamHubActor,
            (fingerprint.to_string(), self.routing.clone()),
        )
        .await
        .map_err(|e| RelayError::StreamWriteFailed(format!("failed to spawn stream hub: {e}")))?;

        actors.insert(fingerprint.to_string(), actor_ref.clone());
        Ok(actor_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn dropping_the_stream_detaches_the_edge_from_routing() {
        let routing = Arc::new(RoutingTable::new(Arc::new(MemoryStore::new())));
        let registry = StreamRegistry::new(routing.clone());

        let mut edge = registry
            .connect("bearer-a", BTreeSet::from(["W1".to_string()]))
            .await
            .unwrap();
        edge.recv().await.unwrap(); // drain the initial "connected" line

        let fingerprint = RoutingTable::fingerprint_of("bearer-a");
        assert!(routing.get_connection(&fingerprint).await.unwrap().is_some());

        drop(edge);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(routing.get_connection(&fingerprint).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn simulated_disconnect_closes_the_stream_after_the_configured_delay() {
        let routing = Arc::new(RoutingTable::new(Arc::new(MemoryStore::new())));
        let registry = StreamRegistry::with_test_config(
            routing,
            TestConfig { simulate_disconnect: true, disconnect_after_ms: 20 },
        );

        let mut edge = registry
            .connect("bearer-a", BTreeSet::from(["W1".to_string()]))
            .await
            .unwrap();
        edge.recv().await.unwrap(); // drain the initial "connected" line

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(edge.recv().await.is_none());
    }
}
