use serde::{Deserialize, Serialize};

/// Status tag an edge reports back for a delivered envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Received,
    Processing,
    Completed,
    Failed,
}

/// Body of `POST /events/status`. Not persisted: logged and acknowledged, giving edges somewhere
/// to report outcomes without the proxy executing business logic on webhook content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStatusReport {
    pub envelope_id: String,
    pub workspace_id: String,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_report() {
        let body = serde_json::json!({
            "envelope_id": "evt-1",
            "workspace_id": "W1",
            "status": "completed"
        });
        let report: EventStatusReport = serde_json::from_value(body).unwrap();
        assert_eq!(report.status, EventStatus::Completed);
        assert!(report.message.is_none());
    }
}
