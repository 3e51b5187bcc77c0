use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::server::state::RelayState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "linear-signature";

/// `POST /webhook` — verify, parse, hand off, and return 200 before fan-out completes.
pub async fn webhook_ingress(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_signature(&state.webhook_signing_secret, &body, signature) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let payload: relay_schema::WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "webhook body failed to parse as JSON");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        dispatcher.dispatch(payload).await;
    });

    Ok(StatusCode::OK)
}

fn verify_signature(secret: &str, body: &[u8], provided_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    expected.as_bytes().ct_eq(provided_hex.as_bytes()).into()
}
