use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::oauth::discover_accessible_workspaces;
use crate::server::guards::BearerCredential;
use crate::server::state::RelayState;

#[derive(Debug, Deserialize)]
pub struct RegisterEdgeRequest {
    pub target_url: String,
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterEdgeResponse {
    #[serde(rename = "edgeId")]
    pub edge_id: String,
    pub secret: String,
}

/// `POST /edges/register` — register an edge for push-mode delivery, scoped to whatever
/// workspaces the registering bearer can see.
pub async fn register_edge(
    State(state): State<RelayState>,
    BearerCredential(bearer): BearerCredential,
    Json(req): Json<RegisterEdgeRequest>,
) -> Result<Json<RegisterEdgeResponse>, StatusCode> {
    let workspaces = discover_accessible_workspaces(&bearer, &state.http_client)
        .await
        .map_err(|_: RelayError| StatusCode::UNAUTHORIZED)?;
    if workspaces.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let workspaces: Vec<String> = workspaces.into_iter().collect();
    let edge = state
        .push
        .register(req.target_url, req.name, req.capabilities, workspaces.clone())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state
        .routing
        .attach_push(edge.edge_id.clone(), workspaces.into_iter().collect())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(RegisterEdgeResponse {
        edge_id: edge.edge_id,
        secret: edge.secret,
    }))
}
