//! Subscription Registry Client.
//!
//! Remote transitions go through the scheduler; the local list is never
//! mutated optimistically. A successful transition is followed by a re-fetch
//! and the server's view replaces ours.
//!
//! Per subscription: ACTIVE <-> INACTIVE via unsubscribe / resubscribe.
//! Anything else is the error family, which the client cannot leave.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::catalog::CatalogState;
use crate::error::{ClientError, Result};
use crate::models::{Ack, CatalogEntry, SubscribeRequest, Subscription, SubscriptionStatus};
use crate::sequence::RequestSequence;
use crate::session::SessionManager;

pub const INTERVAL_MIN: i64 = 1;
pub const INTERVAL_MAX: i64 = i32::MAX as i64;

/// Shown instead of a transition for error-family subscriptions.
pub const SUPPORT_HINT: &str = "This subscription reported an error. Please contact support.";
pub const UNKNOWN_API: &str = "Unknown API";

/// Reject intervals outside `[1, 2^31 - 1]` seconds before anything hits the network.
pub fn validate_interval(interval_seconds: i64) -> Result<i64> {
    if interval_seconds < INTERVAL_MIN {
        return Err(ClientError::Validation(
            "Interval must be at least 1 second.".to_string(),
        ));
    }
    if interval_seconds > INTERVAL_MAX {
        return Err(ClientError::Validation(format!(
            "Interval must not exceed {INTERVAL_MAX} seconds."
        )));
    }
    Ok(interval_seconds)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unsubscribe,
    Resubscribe,
}

impl SubscriptionStatus {
    /// The one transition the client offers from this status, if any.
    pub fn available_transition(&self) -> Option<Transition> {
        match self {
            SubscriptionStatus::Active => Some(Transition::Unsubscribe),
            SubscriptionStatus::Inactive => Some(Transition::Resubscribe),
            SubscriptionStatus::Error(_) => None,
        }
    }
}

/// Dismissible outcome of the last transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionListState {
    pub subscriptions: Vec<Subscription>,
    pub loading: bool,
    pub error: Option<String>,
    pub status_message: Option<StatusMessage>,
}

pub struct SubscriptionRegistry {
    api: ApiClient,
    session: Arc<SessionManager>,
    state: Mutex<SubscriptionListState>,
    sequence: RequestSequence,
}

impl SubscriptionRegistry {
    pub fn new(api: ApiClient, session: Arc<SessionManager>) -> Self {
        Self {
            api,
            session,
            state: Mutex::new(SubscriptionListState::default()),
            sequence: RequestSequence::default(),
        }
    }

    pub fn snapshot(&self) -> SubscriptionListState {
        self.lock().clone()
    }

    pub fn dismiss_status(&self) {
        self.lock().status_message = None;
    }

    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let token = self.session.require_token()?;
        self.api.subscriptions_by_user(&token, user_id).await
    }

    /// Re-fetch the session user's subscriptions into state. Superseded
    /// responses are dropped.
    pub async fn reload(&self) -> SubscriptionListState {
        let ticket = self.sequence.issue();
        {
            let mut state = self.lock();
            state.loading = true;
            state.error = None;
        }

        let user_id = self.session.user_id();
        let result = self.list_by_user(&user_id).await;

        let mut state = self.lock();
        if !self.sequence.is_latest(ticket) {
            debug!(ticket, "discarding superseded subscription list");
            return state.clone();
        }
        state.loading = false;
        match result {
            Ok(subscriptions) => {
                debug!(count = subscriptions.len(), "subscription list replaced");
                state.subscriptions = subscriptions;
            }
            Err(e) => {
                warn!(error = %e, "subscription fetch failed");
                state.error = Some(format!("Failed to fetch subscriptions: {e}"));
            }
        }
        state.clone()
    }

    /// Create an ACTIVE subscription. The interval is checked first and an
    /// out-of-range value never reaches the network.
    pub async fn subscribe(&self, user_id: &str, api_id: i64, interval_seconds: i64) -> Result<Ack> {
        let interval = validate_interval(interval_seconds)?;
        let token = self.session.require_token()?;
        let request = SubscribeRequest {
            user_id: user_id.to_string(),
            api_id,
            interval,
        };
        let result = self.api.subscribe(&token, &request).await;
        self.settle("Subscribed", result).await
    }

    /// ACTIVE -> INACTIVE on the server.
    pub async fn unsubscribe(&self, subscription_id: i64) -> Result<Ack> {
        let token = self.session.require_token()?;
        let result = self.api.unsubscribe(&token, subscription_id).await;
        self.settle("Unsubscribed", result).await
    }

    /// INACTIVE -> ACTIVE on the server.
    pub async fn resubscribe(&self, subscription_id: i64) -> Result<Ack> {
        let token = self.session.require_token()?;
        let result = self.api.resubscribe(&token, subscription_id).await;
        self.settle("Resubscribed", result).await
    }

    /// Run whichever transition the subscription's status allows.
    pub async fn apply_transition(&self, subscription: &Subscription) -> Result<Ack> {
        match subscription.status.available_transition() {
            Some(Transition::Unsubscribe) => self.unsubscribe(subscription.subscription_id).await,
            Some(Transition::Resubscribe) => self.resubscribe(subscription.subscription_id).await,
            None => Err(ClientError::Validation(SUPPORT_HINT.to_string())),
        }
    }

    async fn settle(&self, verb: &str, result: Result<Ack>) -> Result<Ack> {
        match &result {
            Ok(ack) => {
                info!(verb, "subscription transition acknowledged");
                let text = ack.message.clone().unwrap_or_else(|| verb.to_string());
                self.lock().status_message = Some(StatusMessage { text, is_error: false });
                self.reload().await;
            }
            Err(e) => {
                warn!(verb, error = %e, "subscription transition failed");
                self.lock().status_message = Some(StatusMessage {
                    text: e.to_string(),
                    is_error: true,
                });
            }
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, SubscriptionListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Sorting ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    SubscriptionId,
    Container,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortState {
    pub key: Option<SortKey>,
    pub direction: SortDirection,
}

impl SortState {
    /// Selecting the current key flips direction; a new key starts ascending.
    pub fn select(&mut self, key: SortKey) {
        if self.key == Some(key) {
            self.direction = match self.direction {
                SortDirection::Ascending => SortDirection::Descending,
                SortDirection::Descending => SortDirection::Ascending,
            };
        } else {
            self.key = Some(key);
            self.direction = SortDirection::Ascending;
        }
    }
}

fn sort_value(sub: &Subscription, key: SortKey) -> String {
    match key {
        SortKey::SubscriptionId => sub.subscription_id.to_string(),
        SortKey::Container => sub.container.clone(),
        SortKey::Status => sub.status.as_str().to_string(),
    }
}

/// Sort class of a cell. Numbers rank ahead of text so mixed columns still
/// form a total order.
enum SortCell<'a> {
    Number(f64),
    Text(&'a str),
}

impl<'a> SortCell<'a> {
    fn parse(raw: &'a str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => SortCell::Number(n),
            _ => SortCell::Text(raw),
        }
    }
}

/// Numeric between numbers, lexical between text, numbers first.
fn compare_values(a: &str, b: &str) -> Ordering {
    match (SortCell::parse(a), SortCell::parse(b)) {
        (SortCell::Number(x), SortCell::Number(y)) => x.total_cmp(&y),
        (SortCell::Number(_), SortCell::Text(_)) => Ordering::Less,
        (SortCell::Text(_), SortCell::Number(_)) => Ordering::Greater,
        (SortCell::Text(x), SortCell::Text(y)) => x.cmp(y),
    }
}

/// Stable sort: ties keep their original relative order in both directions.
pub fn sort_subscriptions(subscriptions: &mut [Subscription], sort: &SortState) {
    let Some(key) = sort.key else {
        return;
    };
    subscriptions.sort_by(|a, b| {
        let ord = compare_values(&sort_value(a, key), &sort_value(b, key));
        match sort.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

// --- Catalog join ---

#[derive(Debug, Clone)]
pub struct SubscriptionRow {
    pub subscription: Subscription,
    pub api: Option<CatalogEntry>,
}

impl SubscriptionRow {
    pub fn api_label(&self) -> &str {
        match &self.api {
            Some(api) if !api.description.is_empty() => &api.description,
            Some(api) => &api.name,
            None => UNKNOWN_API,
        }
    }
}

/// Pair each subscription with its catalog entry; unresolved ids stay in the list as unknown.
pub fn join_with_catalog(subscriptions: &[Subscription], catalog: &CatalogState) -> Vec<SubscriptionRow> {
    subscriptions
        .iter()
        .map(|sub| SubscriptionRow {
            subscription: sub.clone(),
            api: catalog.find(sub.available_api_id).cloned(),
        })
        .collect()
}
