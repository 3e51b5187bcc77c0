use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use crate::oauth::discover_accessible_workspaces;
use crate::server::guards::BearerCredential;
use crate::server::state::RelayState;

/// `GET /events/stream` — validate the bearer against the upstream, attach, and stream NDJSON.
///
/// `WorkspaceLookupFailed` is deliberately not surfaced through `RelayError::into_response` here:
/// the error-kinds table maps it to 500 for the OAuth callback but 401 for this endpoint, since an
/// unusable bearer on the streaming path is an auth failure, not a server fault.
pub async fn events_stream(
    State(state): State<RelayState>,
    BearerCredential(bearer): BearerCredential,
) -> Response {
    let workspaces = match discover_accessible_workspaces(&bearer, &state.http_client).await {
        Ok(w) if !w.is_empty() => w,
        _ => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let edge_stream = match state.streams.connect(&bearer, workspaces).await {
        Ok(stream) => stream,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let body_stream = edge_stream.map(|line| Ok::<_, std::io::Error>(line));
    let mut response = Response::new(Body::from_stream(body_stream));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response
}
