//! Bidirectional workspace ⇄ edge index backing both delivery modes.
//!
//! Grounded on the teacher's `db` layer role of being the single source of truth other
//! components read/write through a trait object, but rebuilt directly over [`KeyedStore`]
//! instead of a ractor-backed SQLite actor, since the routing table's invariants (last-writer-wins
//! full-record puts, TTL refresh on heartbeat) don't need actor-level sequencing.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_store::KeyedStore;
use serde::{Deserialize, Serialize};

use crate::crypto::EnvelopeCrypto;
use crate::error::RelayError;

const CONNECTION_PREFIX: &str = "edge:connection:";
const WORKSPACE_INDEX_PREFIX: &str = "workspace:edges:";
const ENTRY_TTL: Duration = Duration::from_secs(3600);

/// How a registered edge wants webhooks delivered: held open as an NDJSON stream, or pushed to
/// it as a signed HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    Stream,
    Push,
}

/// Created on successful stream attach or push registration; the unit of webhook delivery for
/// an edge, regardless of which [`DeliveryMode`] it uses. `fingerprint` is the bearer hash for
/// stream-mode edges and the edge id itself for push-mode edges — either way, the identifier
/// `StreamRegistry`/`PushSender` need to actually deliver to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConnection {
    pub fingerprint: String,
    pub bearer: String,
    pub workspaces: BTreeSet<String>,
    pub mode: DeliveryMode,
    pub first_connected_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Reverse map: workspace identifier → set of edge fingerprints with read access to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceEdgeIndex {
    pub fingerprints: BTreeSet<String>,
}

/// The workspace ⇄ edge routing index, keyed by `edge:connection:<fingerprint>` and
/// `workspace:edges:<workspace_id>`, both TTL'd at one hour and refreshed by heartbeat.
pub struct RoutingTable {
    store: Arc<dyn KeyedStore>,
}

impl RoutingTable {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub fn fingerprint_of(bearer: &str) -> String {
        EnvelopeCrypto::fingerprint(bearer)
    }

    fn connection_key(fingerprint: &str) -> String {
        format!("{CONNECTION_PREFIX}{fingerprint}")
    }

    fn workspace_key(workspace_id: &str) -> String {
        format!("{WORKSPACE_INDEX_PREFIX}{workspace_id}")
    }

    /// Register a new streaming connection for `bearer`, granting it read access to
    /// `workspaces`. The bearer is hashed before it ever reaches storage.
    pub async fn attach(
        &self,
        bearer: String,
        workspaces: BTreeSet<String>,
    ) -> Result<EdgeConnection, RelayError> {
        let fingerprint = Self::fingerprint_of(&bearer);
        self.attach_with(fingerprint, bearer, workspaces, DeliveryMode::Stream).await
    }

    /// Register a push-mode edge, identified by the id `PushSender` already assigned it rather
    /// than a bearer hash, so dispatch can hand that id straight back to `PushSender::get`.
    pub async fn attach_push(
        &self,
        edge_id: String,
        workspaces: BTreeSet<String>,
    ) -> Result<EdgeConnection, RelayError> {
        let identifier = edge_id.clone();
        self.attach_with(identifier, edge_id, workspaces, DeliveryMode::Push).await
    }

    async fn attach_with(
        &self,
        fingerprint: String,
        bearer: String,
        workspaces: BTreeSet<String>,
        mode: DeliveryMode,
    ) -> Result<EdgeConnection, RelayError> {
        let now = Utc::now();
        let connection = EdgeConnection {
            fingerprint: fingerprint.clone(),
            bearer,
            workspaces: workspaces.clone(),
            mode,
            first_connected_at: now,
            last_seen_at: now,
        };
        self.put_connection(&connection).await?;
        for workspace_id in &workspaces {
            self.add_to_workspace_index(workspace_id, &fingerprint).await?;
        }
        Ok(connection)
    }

    /// Refresh TTL for the connection and every workspace index entry it participates in.
    pub async fn heartbeat(&self, fingerprint: &str) -> Result<Option<EdgeConnection>, RelayError> {
        let Some(mut connection) = self.get_connection(fingerprint).await? else {
            return Ok(None);
        };
        connection.last_seen_at = Utc::now();
        self.put_connection(&connection).await?;
        for workspace_id in &connection.workspaces {
            self.add_to_workspace_index(workspace_id, fingerprint).await?;
        }
        Ok(Some(connection))
    }

    /// Remove the connection and prune it from every workspace index it belonged to.
    pub async fn detach(&self, fingerprint: &str) -> Result<(), RelayError> {
        if let Some(connection) = self.get_connection(fingerprint).await? {
            for workspace_id in &connection.workspaces {
                self.remove_from_workspace_index(workspace_id, fingerprint).await?;
            }
        }
        self.store.delete(&Self::connection_key(fingerprint)).await?;
        Ok(())
    }

    pub async fn get_connection(&self, fingerprint: &str) -> Result<Option<EdgeConnection>, RelayError> {
        let Some(raw) = self.store.get(&Self::connection_key(fingerprint)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// The fingerprints of every edge currently entitled to webhooks for `workspace_id`.
    pub async fn edges_for_workspace(&self, workspace_id: &str) -> Result<BTreeSet<String>, RelayError> {
        let Some(raw) = self.store.get(&Self::workspace_key(workspace_id)).await? else {
            return Ok(BTreeSet::new());
        };
        let index: WorkspaceEdgeIndex = serde_json::from_slice(&raw)?;
        Ok(index.fingerprints)
    }

    async fn put_connection(&self, connection: &EdgeConnection) -> Result<(), RelayError> {
        let payload = serde_json::to_vec(connection)?;
        self.store
            .put(&Self::connection_key(&connection.fingerprint), payload, Some(ENTRY_TTL))
            .await?;
        Ok(())
    }

    async fn add_to_workspace_index(&self, workspace_id: &str, fingerprint: &str) -> Result<(), RelayError> {
        let mut index = self.load_workspace_index(workspace_id).await?;
        index.fingerprints.insert(fingerprint.to_string());
        self.put_workspace_index(workspace_id, &index).await
    }

    async fn remove_from_workspace_index(&self, workspace_id: &str, fingerprint: &str) -> Result<(), RelayError> {
        let mut index = self.load_workspace_index(workspace_id).await?;
        index.fingerprints.remove(fingerprint);
        if index.fingerprints.is_empty() {
            self.store.delete(&Self::workspace_key(workspace_id)).await?;
            Ok(())
        } else {
            self.put_workspace_index(workspace_id, &index).await
        }
    }

    async fn load_workspace_index(&self, workspace_id: &str) -> Result<WorkspaceEdgeIndex, RelayError> {
        match self.store.get(&Self::workspace_key(workspace_id)).await? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(WorkspaceEdgeIndex::default()),
        }
    }

    async fn put_workspace_index(&self, workspace_id: &str, index: &WorkspaceEdgeIndex) -> Result<(), RelayError> {
        let payload = serde_json::to_vec(index)?;
        self.store
            .put(&Self::workspace_key(workspace_id), payload, Some(ENTRY_TTL))
            .await?;
        Ok(())
    }
}
