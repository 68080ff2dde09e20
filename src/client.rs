//! Wiring: one session shared by the catalog, registry and telemetry view.

use std::sync::Arc;

use tracing::info;

use crate::api::ApiClient;
use crate::catalog::CatalogCache;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::models::{Ack, LoginResponse, RegisterRequest};
use crate::session::SessionManager;
use crate::storage::{CredentialStore, SledCredentialStore};
use crate::subscriptions::SubscriptionRegistry;
use crate::telemetry::TelemetryView;

pub struct HarvestClient {
    pub session: Arc<SessionManager>,
    pub api: ApiClient,
    pub catalog: CatalogCache,
    pub subscriptions: SubscriptionRegistry,
    pub telemetry: TelemetryView,
}

impl HarvestClient {
    /// Open the sled store at `config.store_path` and restore any saved session.
    pub fn open(config: ClientConfig) -> Result<Self> {
        let store = Arc::new(SledCredentialStore::open(&config.store_path)?);
        Self::with_store(config, store)
    }

    pub fn with_store(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let session = Arc::new(SessionManager::new(store)?);
        Self::with_session(config, session)
    }

    pub fn with_session(config: ClientConfig, session: Arc<SessionManager>) -> Result<Self> {
        let api = ApiClient::new(config)?;
        Ok(Self {
            catalog: CatalogCache::new(api.clone(), Arc::clone(&session)),
            subscriptions: SubscriptionRegistry::new(api.clone(), Arc::clone(&session)),
            telemetry: TelemetryView::new(api.clone(), Arc::clone(&session)),
            api,
            session,
        })
    }

    /// Authenticate and start a session with the returned credential.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let resp = self.api.login(email, password).await?;
        self.session
            .set_session(&resp.access_token, &resp.role, &resp.user_id)?;
        info!(user_id = %resp.user_id, "logged in");
        Ok(resp)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Ack> {
        self.api.register(request).await
    }

    pub fn logout(&self) -> Result<()> {
        self.session.clear_session()
    }
}
