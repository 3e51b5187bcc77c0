use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use oauth2::TokenResponse as _;
use relay_schema::WorkspaceMetadata;
use relay_store::KeyedStore;
use tracing::{info, warn};

use crate::config::OauthConfig;
use crate::crypto::Credential;
use crate::error::{IsRetryable, RelayError};
use crate::vault::CredentialVault;

use super::endpoints::UpstreamOauthEndpoints;
use super::state::AuthStateTable;
use super::workspace::WorkspaceDirectory;

/// What the `/oauth/callback` handler should do with a successfully completed authorization.
pub enum HandOff {
    /// CLI flow: the original `callback=` URL with `token`/`workspaceId`/`workspaceName` appended.
    Redirect(url::Url),
    /// Browser flow: an HTML page that bounces to a custom scheme, with a visible fallback link.
    Html(String),
}

/// Orchestrates the authorize → callback → credential-and-workspace-upsert → hand-off flow.
///
/// Grounded on the shape of the teacher's `codex` OAuth route handler, but rebuilt around a
/// state record that carries its own PKCE verifier (see [`super::state::AuthState`]) instead of
/// a signed cookie jar.
pub struct OAuthCoordinator {
    endpoints: UpstreamOauthEndpoints,
    states: AuthStateTable,
    vault: Arc<CredentialVault>,
    workspaces: WorkspaceDirectory,
    http_client: reqwest::Client,
}

impl OAuthCoordinator {
    pub fn new(cfg: &OauthConfig, store: Arc<dyn KeyedStore>, vault: Arc<CredentialVault>) -> Self {
        let endpoints =
            UpstreamOauthEndpoints::new(&cfg.client_id, &cfg.client_secret, &cfg.redirect_uri);
        Self {
            endpoints,
            states: AuthStateTable::new(store.clone()),
            vault,
            workspaces: WorkspaceDirectory::new(store),
            http_client: reqwest::Client::new(),
        }
    }

    /// Issue a fresh AuthState and return the URL to redirect the browser to.
    ///
    /// `final_callback`, if present, is folded into the stored redirect URI so it survives the
    /// round trip and selects the CLI hand-off path at completion.
    pub async fn begin_authorize(
        &self,
        configured_redirect_uri: String,
        final_callback: Option<String>,
    ) -> Result<url::Url, RelayError> {
        let state_id = AuthStateTable::new_state_id();
        let (authorize_url, verifier) = self.endpoints.build_authorize_url(state_id.clone());

        self.states
            .issue(
                state_id,
                configured_redirect_uri,
                verifier.secret().clone(),
                final_callback,
            )
            .await?;

        Ok(authorize_url)
    }

    /// Validate `code`/`state`, exchange the code, discover the viewer, persist the credential
    /// and workspace metadata, and produce the hand-off the caller should perform.
    pub async fn complete_callback(
        &self,
        code: Option<String>,
        state: Option<String>,
    ) -> Result<HandOff, RelayError> {
        let code = code.ok_or_else(|| RelayError::BadRequest("missing code".to_string()))?;
        let state = state.ok_or_else(|| RelayError::BadRequest("missing state".to_string()))?;

        let auth_state = self.states.consume(&state).await?;

        let token = (|| {
            self.endpoints.exchange_authorization_code(
                code.clone(),
                auth_state.pkce_verifier.clone(),
                &self.http_client,
            )
        })
        .retry(ExponentialBuilder::default().with_max_times(3))
        .when(RelayError::is_retryable)
        .await?;

        let access_token = token.access_token().secret().clone();
        let log_prefix: String = access_token.chars().take(10).collect();
        info!(token_prefix = %log_prefix, "exchanged authorization code for access token");

        let viewer = UpstreamOauthEndpoints::fetch_viewer(&access_token, &self.http_client).await?;

        let expires_in = token
            .expires_in()
            .unwrap_or(Duration::from_secs(3600));
        let scopes: Vec<String> = token
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.as_ref().to_string()).collect())
            .unwrap_or_default();

        let cred = Credential {
            access_token,
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at: chrono::Utc::now() + chrono::Duration::from_std(expires_in).unwrap(),
            obtained_at: chrono::Utc::now(),
            scopes,
            token_type: "Bearer".to_string(),
            viewer_user_id: viewer.viewer.id.clone(),
            viewer_email: viewer.viewer.email.clone(),
            workspace_id: viewer.organization.id.clone(),
        };
        self.vault.save(&cred).await?;

        let metadata = WorkspaceMetadata::new(
            viewer.organization.id.clone(),
            viewer.organization.name.clone(),
            viewer.organization.url_key.clone(),
            viewer
                .organization
                .teams
                .nodes
                .into_iter()
                .map(|t| relay_schema::TeamRef {
                    id: t.id,
                    name: t.name,
                })
                .collect(),
        );
        self.workspaces.upsert(&metadata).await?;

        info!(
            workspace_id = %metadata.workspace_id,
            workspace_name = %metadata.name,
            "oauth authorization completed"
        );

        Ok(self.build_handoff(&auth_state, &cred, &metadata))
    }

    fn build_handoff(
        &self,
        auth_state: &super::state::AuthState,
        cred: &Credential,
        metadata: &WorkspaceMetadata,
    ) -> HandOff {
        let Some(callback) = &auth_state.final_callback else {
            return HandOff::Html(render_handoff_page(cred, metadata));
        };

        let mut url = match url::Url::parse(callback) {
            Ok(u) => u,
            Err(_) => {
                warn!(callback, "stored callback url failed to parse; falling back to html handoff");
                return HandOff::Html(render_handoff_page(cred, metadata));
            }
        };
        url.query_pairs_mut()
            .append_pair("token", &cred.access_token)
            .append_pair("workspaceId", &metadata.workspace_id)
            .append_pair("workspaceName", &metadata.name);
        HandOff::Redirect(url)
    }
}

fn render_handoff_page(cred: &Credential, metadata: &WorkspaceMetadata) -> String {
    fn enc(s: &str) -> String {
        url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
    }

    let timestamp = chrono::Utc::now().to_rfc3339();
    let target = format!(
        "edge-relay://complete?proxyUrl={}&token={}&workspaceId={}&workspaceName={}&timestamp={}",
        enc(""),
        enc(&cred.access_token),
        enc(&metadata.workspace_id),
        enc(&metadata.name),
        enc(&timestamp),
    );
    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <meta http-equiv="refresh" content="0;url={target}">
  <title>Authorization complete</title>
  <script>window.location.href = {target:?};</script>
</head>
<body>
  <p>Authorization complete for <strong>{name}</strong>.</p>
  <p id="fallback" style="display:none">
    If you were not redirected automatically, <a href="{target}">click here to continue</a>.
  </p>
  <script>
    setTimeout(function () {{
      document.getElementById('fallback').style.display = 'block';
    }}, 2000);
  </script>
</body>
</html>"#,
        name = metadata.name,
    )
}
