use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    StandardRevocableToken, TokenUrl,
    basic::{BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse, BasicTokenResponse},
};
use serde::Deserialize;

use crate::error::RelayError;

const AUTHORIZE_URL: &str = "https://linear.app/oauth/authorize";
const TOKEN_URL: &str = "https://api.linear.app/oauth/token";
const VIEWER_QUERY_URL: &str = "https://api.linear.app/graphql";

const SCOPES: &[&str] = &["read", "write", "app:assignable", "app:mentionable"];

pub(crate) type UpstreamOauthClient<
    HasAuthUrl = EndpointSet,
    HasDeviceAuthUrl = EndpointNotSet,
    HasIntrospectionUrl = EndpointNotSet,
    HasRevocationUrl = EndpointNotSet,
    HasTokenUrl = EndpointSet,
> = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    HasAuthUrl,
    HasDeviceAuthUrl,
    HasIntrospectionUrl,
    HasRevocationUrl,
    HasTokenUrl,
>;

pub(crate) struct UpstreamOauthEndpoints {
    client: UpstreamOauthClient,
}

impl UpstreamOauthEndpoints {
    pub(crate) fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        let client = OAuth2Client::new(ClientId::new(client_id.to_string()))
            .set_client_secret(ClientSecret::new(client_secret.to_string()))
            .set_auth_uri(AuthUrl::new(AUTHORIZE_URL.to_string()).expect("valid authorize url"))
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).expect("valid token url"))
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri.to_string()).expect("valid configured redirect uri"),
            );
        Self { client }
    }

    /// Build the browser-facing authorize URL plus the PKCE verifier that must be persisted
    /// alongside `state` for the matching callback. `state` is supplied by the caller (rather
    /// than generated here) so it can double as the [`crate::oauth::AuthState`] lookup key.
    pub(crate) fn build_authorize_url(&self, state: String) -> (url::Url, PkceCodeVerifier) {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let mut req = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .set_pkce_challenge(challenge)
            .add_extra_param("actor", "app")
            .add_extra_param("prompt", "consent");

        for scope in SCOPES {
            req = req.add_scope(Scope::new((*scope).to_string()));
        }

        let (url, _csrf_token) = req.url();
        (url, verifier)
    }

    pub(crate) async fn exchange_authorization_code(
        &self,
        code: String,
        verifier: String,
        http_client: &reqwest::Client,
    ) -> Result<BasicTokenResponse, RelayError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier))
            .request_async(http_client)
            .await?;
        Ok(response)
    }

    /// Discover the viewer's identity and their organization (workspace) via an authenticated
    /// GraphQL query against the upstream API, using the freshly obtained access token.
    pub(crate) async fn fetch_viewer(
        access_token: &str,
        http_client: &reqwest::Client,
    ) -> Result<ViewerResponse, RelayError> {
        const QUERY: &str = r#"
            query Viewer {
                viewer { id email }
                organization { id name urlKey teams { nodes { id name } } }
            }
        "#;

        let resp = http_client
            .post(VIEWER_QUERY_URL)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "query": QUERY }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(RelayError::WorkspaceLookupFailed(format!(
                "viewer query returned status {}",
                resp.status()
            )));
        }

        let body: GraphQlEnvelope = resp
            .json()
            .await
            .map_err(|e| RelayError::WorkspaceLookupFailed(e.to_string()))?;
        body.data
            .ok_or_else(|| RelayError::WorkspaceLookupFailed("empty viewer response".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    data: Option<ViewerResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ViewerResponse {
    pub viewer: ViewerIdentity,
    pub organization: OrganizationRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ViewerIdentity {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrganizationRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "urlKey")]
    pub url_key: String,
    pub teams: TeamsConnection,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TeamsConnection {
    pub nodes: Vec<TeamNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TeamNode {
    pub id: String,
    pub name: String,
}
