use std::collections::BTreeSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use relay_store::MemoryStore;
use sha2::Sha256;
use tower::ServiceExt;

use edge_relay::config::Config;
use edge_relay::server::{RelayState, build_router};

type HmacSha256 = Hmac<Sha256>;

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.oauth.client_id = "client".to_string();
    cfg.oauth.client_secret = "secret".to_string();
    cfg.oauth.redirect_uri = "https://relay.example/oauth/callback".to_string();
    cfg.oauth.webhook_signing_secret = "whsec-test".to_string();
    cfg.oauth.credential_encryption_key = "0123456789abcdef0123456789abcdef".to_string();
    cfg
}

fn test_state() -> RelayState {
    RelayState::new(&test_config(), Arc::new(MemoryStore::new()))
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[tokio::test]
async fn webhook_without_signature_header_is_rejected() {
    let state = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"organizationId":"W1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_tampered_signature_is_rejected() {
    let state = test_state();
    let app = build_router(state);

    let body = r#"{"organizationId":"W1"}"#;
    let signature = sign("wrong-secret", body.as_bytes());

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .header("linear-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_fans_out_to_every_connected_edge_in_the_workspace() {
    let state = test_state();

    // Attach two streaming edges to workspace W1, bypassing the upstream-identity lookup the
    // real `/events/stream` handler would perform, since `StreamRegistry::connect` itself takes
    // the already-resolved workspace set.
    let mut rx_a = state
        .streams
        .connect("bearer-edge-a", BTreeSet::from(["W1".to_string()]))
        .await
        .unwrap();
    let mut rx_b = state
        .streams
        .connect("bearer-edge-b", BTreeSet::from(["W1".to_string()]))
        .await
        .unwrap();

    // Each hub immediately emits a `connection` line on attach; drain it before asserting on the
    // webhook fan-out below.
    assert!(rx_a.recv().await.unwrap().contains("\"connection\""));
    assert!(rx_b.recv().await.unwrap().contains("\"connection\""));

    let app = build_router(state);
    let body = r#"{"organizationId":"W1","action":"issueAssignedToYou","data":{"issueId":"ISS-1"}}"#;
    let signature = sign("whsec-test", body.as_bytes());

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .header("linear-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let line_a = tokio::time::timeout(std::time::Duration::from_secs(2), rx_a.recv())
        .await
        .expect("timed out waiting for fan-out")
        .expect("channel closed");
    let line_b = tokio::time::timeout(std::time::Duration::from_secs(2), rx_b.recv())
        .await
        .expect("timed out waiting for fan-out")
        .expect("channel closed");

    for line in [&line_a, &line_b] {
        assert!(line.contains("\"webhook\""));
        assert!(line.contains("issueAssignedToYou"));
        assert!(line.contains("ISS-1"));
    }
}

#[tokio::test]
async fn webhook_for_workspace_with_no_edges_still_returns_200() {
    let state = test_state();
    let app = build_router(state);

    let body = r#"{"organizationId":"W-unknown"}"#;
    let signature = sign("whsec-test", body.as_bytes());

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .header("linear-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}
