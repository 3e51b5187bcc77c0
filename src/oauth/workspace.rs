use std::sync::Arc;
use std::time::Duration;

use relay_schema::WorkspaceMetadata;
use relay_store::KeyedStore;

use crate::error::RelayError;

const KEY_PREFIX: &str = "workspace:meta:";
const META_TTL: Duration = Duration::from_secs(24 * 3600);

/// Read side of `WorkspaceMetadata`, upserted by [`super::OAuthCoordinator`] on every completed
/// authorization so diagnostics can render a workspace name without re-querying the upstream.
pub struct WorkspaceDirectory {
    store: Arc<dyn KeyedStore>,
}

impl WorkspaceDirectory {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    fn key(workspace_id: &str) -> String {
        format!("{KEY_PREFIX}{workspace_id}")
    }

    pub async fn upsert(&self, metadata: &WorkspaceMetadata) -> Result<(), RelayError> {
        let payload = serde_json::to_vec(metadata)?;
        self.store
            .put(&Self::key(&metadata.workspace_id), payload, Some(META_TTL))
            .await?;
        Ok(())
    }

    pub async fn get(&self, workspace_id: &str) -> Result<Option<WorkspaceMetadata>, RelayError> {
        let Some(raw) = self.store.get(&Self::key(workspace_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_schema::TeamRef;
    use relay_store::MemoryStore;

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let dir = WorkspaceDirectory::new(Arc::new(MemoryStore::new()));
        let meta = WorkspaceMetadata::new(
            "W1".to_string(),
            "Acme".to_string(),
            "acme".to_string(),
            vec![TeamRef {
                id: "T1".to_string(),
                name: "Core".to_string(),
            }],
        );
        dir.upsert(&meta).await.unwrap();
        let fetched = dir.get("W1").await.unwrap().unwrap();
        assert_eq!(fetched.workspace_id, "W1");
        assert_eq!(fetched.teams.len(), 1);
    }

    #[tokio::test]
    async fn absent_workspace_returns_none() {
        let dir = WorkspaceDirectory::new(Arc::new(MemoryStore::new()));
        assert!(dir.get("nope").await.unwrap().is_none());
    }
}
