use serde::{Deserialize, Serialize};

/// Body of an inbound upstream webhook, as posted to `/webhook`.
///
/// The proxy does not interpret webhook contents beyond routing: it reads `organization_id`
/// to pick a destination workspace, then forwards `raw` untouched inside an `Envelope`. Fields
/// beyond `organization_id` are deliberately not modeled — the upstream's webhook schema is
/// out of this crate's control and grows fields over time without our involvement.
///
/// `organization_id` is optional rather than required: some webhook event types (and malformed
/// or custom integrations) omit it, and the proxy must still parse the body to log and drop it
/// rather than reject the whole request at the deserialization layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "organizationId", default)]
    pub organization_id: Option<String>,

    #[serde(flatten)]
    pub raw: serde_json::Value,
}

impl WebhookPayload {
    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    /// Reconstruct the verbatim upstream body (organization id plus every other field) so it can
    /// be forwarded to edges untouched inside an `Envelope`.
    pub fn into_value(self) -> serde_json::Value {
        serde_json::to_value(self).expect("WebhookPayload always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_organization_id_and_keeps_rest() {
        let body = serde_json::json!({
            "organizationId": "org_123",
            "action": "issueAssignedToYou",
            "data": {"issueId": "ISS-1"}
        });
        let payload: WebhookPayload = serde_json::from_value(body).unwrap();
        assert_eq!(payload.organization_id(), Some("org_123"));
        assert_eq!(payload.raw["action"], "issueAssignedToYou");
    }

    #[test]
    fn missing_organization_id_still_parses() {
        let body = serde_json::json!({
            "action": "issueAssignedToYou",
            "data": {"issueId": "ISS-1"}
        });
        let payload: WebhookPayload = serde_json::from_value(body).unwrap();
        assert_eq!(payload.organization_id(), None);
    }
}
