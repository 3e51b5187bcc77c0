use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use relay_schema::{EventStatus, EventStatusReport};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::server::guards::BearerCredential;
use crate::server::state::RelayState;

/// `POST /events/status` — logged only, not persisted; always acknowledges.
pub async fn events_status(
    State(_state): State<RelayState>,
    BearerCredential(_bearer): BearerCredential,
    body: axum::body::Bytes,
) -> Result<Json<Value>, StatusCode> {
    let report: EventStatusReport =
        serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?;

    match report.status {
        EventStatus::Failed => warn!(
            envelope_id = %report.envelope_id,
            workspace_id = %report.workspace_id,
            message = ?report.message,
            "edge reported failed delivery"
        ),
        status => info!(
            envelope_id = %report.envelope_id,
            workspace_id = %report.workspace_id,
            ?status,
            "edge status report"
        ),
    }

    Ok(Json(json!({ "received": true })))
}
