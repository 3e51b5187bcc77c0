use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::error::RelayError;
use crate::oauth::HandOff;
use crate::server::state::RelayState;

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub callback: Option<String>,
}

/// `GET /oauth/authorize[?callback=URL]` — redirect the browser to the upstream.
pub async fn authorize(
    State(state): State<RelayState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Redirect, RelayError> {
    let url = state
        .oauth
        .begin_authorize(state.oauth_redirect_uri.to_string(), query.callback)
        .await?;
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// `GET /oauth/callback?code=…&state=…` — complete the exchange and hand off to the caller.
pub async fn callback(
    State(state): State<RelayState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match state.oauth.complete_callback(query.code, query.state).await {
        Ok(HandOff::Redirect(url)) => Redirect::to(url.as_str()).into_response(),
        Ok(HandOff::Html(page)) => (StatusCode::OK, Html(page)).into_response(),
        Err(e) => e.into_response(),
    }
}
