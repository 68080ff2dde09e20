//! Session Manager.
//!
//! Owns the in-memory credential and is the only writer of the
//! [`CredentialStore`]. Share it with `Arc`; there is no global session.
//!
//! State machine: Unauthenticated -> Authenticated on [`SessionManager::set_session`],
//! back on [`SessionManager::clear_session`] or when [`SessionManager::check_token`]
//! finds the token expired or undecodable. No refresh path exists.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::auth::{classify, now_epoch, TokenStatus};
use crate::error::{ClientError, Result};
use crate::models::Credential;
use crate::storage::CredentialStore;

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Session transitions, published for whoever drives navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: String },
    LoggedOut,
    /// Forced logout; consumers send the user to the login entry point with `message`.
    Expired { message: String },
}

pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    state: Mutex<Credential>,
    events: broadcast::Sender<SessionEvent>,
    clock: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl SessionManager {
    /// Initialise from whatever the store currently holds.
    pub fn new(store: Arc<dyn CredentialStore>) -> Result<Self> {
        Self::with_clock(store, now_epoch)
    }

    /// Same as [`SessionManager::new`] with an injected clock (seconds since epoch).
    pub fn with_clock(
        store: Arc<dyn CredentialStore>,
        clock: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Result<Self> {
        let credential = store.load()?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            store,
            state: Mutex::new(credential),
            events,
            clock: Box::new(clock),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Overwrite and persist. The token is not validated until it is read.
    pub fn set_session(&self, token: &str, role: &str, user_id: &str) -> Result<()> {
        let credential = Credential::new(token, role, user_id);
        self.store.save(&credential)?;
        *self.lock() = credential;
        info!(user_id, role, "session started");
        self.publish(SessionEvent::LoggedIn {
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    pub fn clear_session(&self) -> Result<()> {
        self.reset()?;
        info!("session cleared");
        self.publish(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Inspect the token; an expired or undecodable one ends the session and
    /// publishes [`SessionEvent::Expired`].
    pub fn check_token(&self) -> TokenStatus {
        let token = self.lock().token.clone();
        let status = classify(&token, (self.clock)());
        if status.forces_logout() {
            warn!(?status, "token rejected, forcing logout");
            if let Err(e) = self.reset() {
                // In-memory state is already cleared; only persistence failed
                warn!(error = %e, "failed to clear persisted credentials");
            }
            self.publish(SessionEvent::Expired {
                message: SESSION_EXPIRED_MESSAGE.to_string(),
            });
        }
        status
    }

    pub fn is_logged_in(&self) -> bool {
        self.check_token();
        !self.lock().token.is_empty()
    }

    /// Current token after a check; empty when there is no valid session.
    pub fn get_valid_token(&self) -> String {
        self.check_token();
        self.lock().token.clone()
    }

    /// Token for an authenticated request, or [`ClientError::AuthExpired`].
    pub fn require_token(&self) -> Result<String> {
        let token = self.get_valid_token();
        if token.is_empty() {
            return Err(ClientError::AuthExpired);
        }
        Ok(token)
    }

    pub fn credential(&self) -> Credential {
        self.lock().clone()
    }

    pub fn role(&self) -> String {
        self.lock().role.clone()
    }

    pub fn user_id(&self) -> String {
        self.lock().user_id.clone()
    }

    fn reset(&self) -> Result<()> {
        *self.lock() = Credential::default();
        self.store.clear()
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Credential> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
