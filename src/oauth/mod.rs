//! Authorize/callback/hand-off flow against the upstream's OAuth2 + PKCE endpoints.
//!
//! Grounded on the teacher's `providers/codex/client/oauth` module for client construction and
//! retry-guarded code exchange, adapted from a fixed single-tenant CLI client to a
//! configuration-driven multi-tenant one, and on `server/routes/codex/oauth.rs` for the
//! authorize/callback handler shape (rebuilt around [`state::AuthState`] instead of a cookie jar).

mod coordinator;
mod endpoints;
mod state;
mod workspace;

use std::collections::BTreeSet;

pub use coordinator::{HandOff, OAuthCoordinator};
pub use state::{AuthState, AuthStateTable};
pub use workspace::WorkspaceDirectory;

use crate::error::RelayError;
use endpoints::UpstreamOauthEndpoints;

/// Validate a bearer credential by using it against the upstream's viewer endpoint, returning
/// the set of workspace identifiers it grants access to. An empty/errored lookup is the caller's
/// cue to reject with 401 — this never maps `WorkspaceLookupFailed` to 500 itself.
pub async fn discover_accessible_workspaces(
    bearer: &str,
    http_client: &reqwest::Client,
) -> Result<BTreeSet<String>, RelayError> {
    let viewer = UpstreamOauthEndpoints::fetch_viewer(bearer, http_client).await?;
    Ok(BTreeSet::from([viewer.organization.id]))
}
