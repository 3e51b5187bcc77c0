use std::sync::Arc;

use relay_store::KeyedStore;

use crate::config::Config;
use crate::crypto::EnvelopeCrypto;
use crate::dispatch::Dispatcher;
use crate::oauth::OAuthCoordinator;
use crate::push::PushSender;
use crate::routing::RoutingTable;
use crate::stream::StreamRegistry;
use crate::vault::CredentialVault;

/// Shared application state handed to every axum handler, grounded on the teacher's
/// `PolluxState` (a single `Clone`-cheap struct of `Arc`-wrapped shared services plus the
/// plain-value config it was built from).
#[derive(Clone)]
pub struct RelayState {
    pub routing: Arc<RoutingTable>,
    pub streams: Arc<StreamRegistry>,
    pub push: Arc<PushSender>,
    pub vault: Arc<CredentialVault>,
    pub oauth: Arc<OAuthCoordinator>,
    pub dispatcher: Arc<Dispatcher>,
    pub http_client: reqwest::Client,
    pub webhook_signing_secret: Arc<str>,
    pub oauth_redirect_uri: Arc<str>,
}

impl RelayState {
    pub fn new(cfg: &Config, store: Arc<dyn KeyedStore>) -> Self {
        let crypto = Arc::new(EnvelopeCrypto::new(&cfg.oauth.credential_encryption_key));
        let routing = Arc::new(RoutingTable::new(store.clone()));
        let streams = Arc::new(StreamRegistry::with_test_config(routing.clone(), cfg.test));
        let push = Arc::new(PushSender::new(store.clone()));
        let vault = Arc::new(CredentialVault::new(store.clone(), crypto));
        let oauth = Arc::new(OAuthCoordinator::new(&cfg.oauth, store.clone(), vault.clone()));
        let dispatcher = Arc::new(Dispatcher::new(routing.clone(), streams.clone(), push.clone()));

        Self {
            routing,
            streams,
            push,
            vault,
            oauth,
            dispatcher,
            http_client: reqwest::Client::new(),
            webhook_signing_secret: Arc::from(cfg.oauth.webhook_signing_secret.as_str()),
            oauth_redirect_uri: Arc::from(cfg.oauth.redirect_uri.as_str()),
        }
    }
}
