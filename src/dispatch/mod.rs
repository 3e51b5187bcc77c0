//! Fans a verified webhook out to every edge entitled to the workspace it belongs to, choosing
//! StreamHub or PushSender delivery per edge depending on how that edge registered.

use std::sync::Arc;

use relay_schema::{Envelope, WebhookPayload};
use tracing::{info, warn};

use crate::push::PushSender;
use crate::routing::{DeliveryMode, RoutingTable};
use crate::stream::StreamRegistry;

pub struct Dispatcher {
    routing: Arc<RoutingTable>,
    streams: Arc<StreamRegistry>,
    push: Arc<PushSender>,
}

impl Dispatcher {
    pub fn new(routing: Arc<RoutingTable>, streams: Arc<StreamRegistry>, push: Arc<PushSender>) -> Self {
        Self { routing, streams, push }
    }

    /// Deliver `payload` to every edge with access to its workspace. Returns the number of edges
    /// the envelope was handed to (not necessarily the number that eventually accepted it).
    ///
    /// Webhooks with no `organization_id` can't be routed to any workspace, so they are logged
    /// and dropped here rather than rejected at the HTTP layer — the upstream sends event types
    /// that omit it, and those still deserve a 200 rather than a parse failure.
    pub async fn dispatch(&self, payload: WebhookPayload) -> usize {
        let Some(workspace_id) = payload.organization_id().map(str::to_string) else {
            info!("webhook missing organization_id; dropping");
            return 0;
        };
        let envelope = Envelope::webhook(payload.into_value());

        let fingerprints = match self.routing.edges_for_workspace(&workspace_id).await {
            Ok(f) => f,
            Err(e) => {
                warn!(workspace_id, error = %e, "routing lookup failed; dropping webhook");
                return 0;
            }
        };

        if fingerprints.is_empty() {
            info!(workspace_id, "no edges registered for workspace; dropping webhook");
            return 0;
        }

        let deliveries = fingerprints.into_iter().map(|fingerprint| {
            let envelope = envelope.clone();
            async move {
                self.dispatch_one(&fingerprint, envelope).await;
            }
        });

        futures::future::join_all(deliveries).await.len()
    }

    /// Deliver a single envelope to `fingerprint`, branching on the delivery mode recorded for
    /// it in the routing table. An edge with no routing entry (already detached, or never
    /// attached) is skipped rather than treated as an error.
    async fn dispatch_one(&self, fingerprint: &str, envelope: Envelope) {
        let connection = match self.routing.get_connection(fingerprint).await {
            Ok(Some(c)) => c,
            Ok(None) => return,
            Err(e) => {
                warn!(fingerprint, error = %e, "routing lookup for edge failed");
                return;
            }
        };

        match connection.mode {
            DeliveryMode::Stream => {
                if let Err(e) = self.streams.send(fingerprint, envelope).await {
                    warn!(fingerprint, error = %e, "stream delivery failed");
                }
            }
            DeliveryMode::Push => {
                self.dispatch_push(fingerprint, envelope).await;
            }
        }
    }

    /// Push-mode delivery for a single registered edge, identified by the id `PushSender`
    /// assigned it at `POST /edges/register` (the same id `register_edge` records in the
    /// routing table).
    async fn dispatch_push(&self, edge_id: &str, envelope: Envelope) -> bool {
        let Ok(Some(edge)) = self.push.get(edge_id).await else {
            warn!(edge_id, "push dispatch requested for unknown edge");
            return false;
        };
        match self.push.send(&edge, &envelope).await {
            Ok(()) => true,
            Err(e) => {
                warn!(edge_id, error = %e, "push dispatch failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::MemoryStore;
    use std::collections::BTreeSet;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(store: Arc<dyn relay_store::KeyedStore>) -> (Dispatcher, Arc<RoutingTable>, Arc<StreamRegistry>) {
        let routing = Arc::new(RoutingTable::new(store.clone()));
        let streams = Arc::new(StreamRegistry::new(routing.clone()));
        let push = Arc::new(PushSender::new(store));
        (Dispatcher::new(routing.clone(), streams.clone(), push), routing, streams)
    }

    fn payload(organization_id: Option<&str>) -> WebhookPayload {
        let mut value = serde_json::json!({"action": "issueAssignedToYou"});
        if let Some(id) = organization_id {
            value["organizationId"] = serde_json::Value::String(id.to_string());
        }
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn missing_organization_id_is_dropped_without_a_routing_lookup() {
        let (dispatcher, _routing, _streams) = dispatcher(Arc::new(MemoryStore::new()));
        assert_eq!(dispatcher.dispatch(payload(None)).await, 0);
    }

    #[tokio::test]
    async fn workspace_with_no_edges_is_dropped() {
        let (dispatcher, _routing, _streams) = dispatcher(Arc::new(MemoryStore::new()));
        assert_eq!(dispatcher.dispatch(payload(Some("W1"))).await, 0);
    }

    #[tokio::test]
    async fn stream_registered_edge_receives_the_envelope() {
        let (dispatcher, _routing, streams) = dispatcher(Arc::new(MemoryStore::new()));
        let mut rx = streams
            .connect("bearer-a", BTreeSet::from(["W1".to_string()]))
            .await
            .unwrap();
        rx.recv().await.unwrap(); // drain the initial "connected" envelope

        assert_eq!(dispatcher.dispatch(payload(Some("W1"))).await, 1);
        let line = rx.recv().await.unwrap();
        assert!(line.contains("\"webhook\""));
    }

    #[tokio::test]
    async fn push_registered_edge_receives_the_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store: Arc<dyn relay_store::KeyedStore> = Arc::new(MemoryStore::new());
        let routing = Arc::new(RoutingTable::new(store.clone()));
        let streams = Arc::new(StreamRegistry::new(routing.clone()));
        let push = Arc::new(PushSender::new(store));
        let dispatcher = Dispatcher::new(routing.clone(), streams, push.clone());

        let edge = push
            .register(server.uri(), "laptop".to_string(), vec![], vec!["W1".to_string()])
            .await
            .unwrap();
        routing
            .attach_push(edge.edge_id.clone(), BTreeSet::from(["W1".to_string()]))
            .await
            .unwrap();

        assert_eq!(dispatcher.dispatch(payload(Some("W1"))).await, 1);
    }
}
