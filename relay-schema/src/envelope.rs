use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local monotonic counter, purely for making envelope ids easy to eyeball in logs.
/// Not a correctness input: the wall-clock suffix on [`Envelope::next_id`] is what makes ids
/// unique across restarts.
static EVENT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    Connection,
    Heartbeat,
    Webhook,
}

/// A single line on an edge's `/events/stream` wire.
///
/// `data` carries the verbatim upstream webhook body for `type=webhook` and is omitted
/// entirely for `connection`/`heartbeat` lines — never emitted as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    fn next_id() -> String {
        let seq = EVENT_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{seq}-{}", Utc::now().timestamp_millis())
    }

    pub fn connection(status: &str) -> Self {
        Self {
            id: Self::next_id(),
            kind: EnvelopeType::Connection,
            timestamp: Utc::now().to_rfc3339(),
            data: Some(serde_json::json!({ "status": status })),
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            id: Self::next_id(),
            kind: EnvelopeType::Heartbeat,
            timestamp: Utc::now().to_rfc3339(),
            data: None,
        }
    }

    pub fn webhook(payload: serde_json::Value) -> Self {
        Self {
            id: Self::next_id(),
            kind: EnvelopeType::Webhook,
            timestamp: Utc::now().to_rfc3339(),
            data: Some(payload),
        }
    }

    /// Render as exactly one compact JSON object followed by `\n` — the `/events/stream` wire
    /// format. No pretty-printing, no trailing commas.
    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_envelope_is_first_line_shaped() {
        let env = Envelope::connection("connected");
        let line = env.to_ndjson_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["type"], "connection");
        assert_eq!(parsed["data"]["status"], "connected");
    }

    #[test]
    fn heartbeat_envelope_omits_data_field() {
        let env = Envelope::heartbeat();
        let line = env.to_ndjson_line().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert!(parsed.get("data").is_none());
    }

    #[test]
    fn webhook_envelope_roundtrips() {
        let payload = serde_json::json!({"organizationId": "W1", "action": "issueAssignedToYou"});
        let env = Envelope::webhook(payload.clone());
        let line = env.to_ndjson_line().unwrap();
        let decoded: Envelope = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(decoded.kind, EnvelopeType::Webhook);
        assert_eq!(decoded.data, Some(payload));
    }

    #[test]
    fn ids_are_unique_within_process() {
        let a = Envelope::heartbeat();
        let b = Envelope::heartbeat();
        assert_ne!(a.id, b.id);
    }
}
