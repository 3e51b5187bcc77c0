use serde::{Deserialize, Serialize};

/// A team the workspace's upstream organization contains, as reported at OAuth completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: String,
    pub name: String,
}

/// Stored under `workspace:meta:<workspace_id>`, refreshed on every successful OAuth
/// completion for that workspace and read by the dashboard/status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub workspace_id: String,
    pub name: String,
    pub slug: String,
    pub teams: Vec<TeamRef>,
    pub updated_at: String,
}

impl WorkspaceMetadata {
    pub fn new(workspace_id: impl Into<String>, name: impl Into<String>, slug: impl Into<String>, teams: Vec<TeamRef>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            name: name.into(),
            slug: slug.into(),
            teams,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let meta = WorkspaceMetadata::new(
            "W1",
            "Acme",
            "acme",
            vec![TeamRef { id: "T1".into(), name: "Core".into() }],
        );
        let json = serde_json::to_vec(&meta).unwrap();
        let decoded: WorkspaceMetadata = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, meta);
    }
}
