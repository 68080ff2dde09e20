//! Catalog Cache: the list of subscribable APIs.
//!
//! The collection is replaced wholesale on every successful fetch and never
//! patched. Loading and error are explicit state next to the data.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::Result;
use crate::models::CatalogEntry;
use crate::sequence::RequestSequence;
use crate::session::SessionManager;

const FETCH_FAILED: &str = "Failed to fetch API data";

#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    pub entries: Arc<Vec<CatalogEntry>>,
    pub loading: bool,
    pub error: Option<String>,
}

impl CatalogState {
    pub fn find(&self, api_id: i64) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == api_id)
    }
}

pub struct CatalogCache {
    api: ApiClient,
    session: Arc<SessionManager>,
    state: Mutex<CatalogState>,
    sequence: RequestSequence,
}

impl CatalogCache {
    pub fn new(api: ApiClient, session: Arc<SessionManager>) -> Self {
        Self {
            api,
            session,
            state: Mutex::new(CatalogState::default()),
            sequence: RequestSequence::default(),
        }
    }

    pub fn snapshot(&self) -> CatalogState {
        self.lock().clone()
    }

    pub fn find(&self, api_id: i64) -> Option<CatalogEntry> {
        self.lock().find(api_id).cloned()
    }

    /// Fetch with an explicit token. Errors are returned and also recorded in state.
    pub async fn fetch_catalog(&self, token: &str) -> Result<Arc<Vec<CatalogEntry>>> {
        let ticket = self.begin();
        let result = self.api.available_apis(token).await.map(Arc::new);
        self.finish(ticket, &result);
        result
    }

    /// Re-fetch with the session's token. Never fails; inspect the returned state.
    pub async fn refresh(&self) -> CatalogState {
        let ticket = self.begin();
        let result = match self.session.require_token() {
            Ok(token) => self.api.available_apis(&token).await.map(Arc::new),
            Err(e) => Err(e),
        };
        self.finish(ticket, &result);
        self.snapshot()
    }

    fn begin(&self) -> u64 {
        let ticket = self.sequence.issue();
        let mut state = self.lock();
        state.loading = true;
        state.error = None;
        ticket
    }

    fn finish(&self, ticket: u64, result: &Result<Arc<Vec<CatalogEntry>>>) {
        let mut state = self.lock();
        if !self.sequence.is_latest(ticket) {
            debug!(ticket, "discarding superseded catalog response");
            return;
        }
        state.loading = false;
        match result {
            Ok(entries) => {
                debug!(count = entries.len(), "catalog replaced");
                state.entries = Arc::clone(entries);
                state.error = None;
            }
            Err(e) => {
                warn!(error = %e, "catalog fetch failed");
                state.error = Some(format!("{FETCH_FAILED}: {e}"));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
