//! Error types for the harvest client.
//!
//! Every failure maps onto one of four user-facing families (see [`ErrorKind`]):
//! expired sessions force a logout, network failures become dismissible
//! status messages, validation failures block the request entirely and
//! telemetry parse failures only degrade a single row.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

/// Remote operation a request belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    Register,
    CatalogFetch,
    SubscriptionFetch,
    Subscribe,
    Unsubscribe,
    Resubscribe,
    TelemetryFetch,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Login => "login",
            Operation::Register => "registration",
            Operation::CatalogFetch => "catalog fetch",
            Operation::SubscriptionFetch => "subscription fetch",
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Resubscribe => "resubscribe",
            Operation::TelemetryFetch => "telemetry fetch",
        };
        f.write_str(name)
    }
}

/// Coarse classification used by consumers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Token missing, undecodable or expired. Forces logout.
    AuthExpired,
    /// Non-2xx status or transport failure.
    Network,
    /// Client-side input out of bounds; no request was issued.
    Validation,
    /// Malformed payload.
    Parse,
    /// Local storage or serialization failure.
    Internal,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Your session has expired. Please log in again.")]
    AuthExpired,

    #[error("{0}")]
    Validation(String),

    /// Server answered with a non-success status.
    #[error("{op} failed ({status}): {message}")]
    Request {
        op: Operation,
        status: StatusCode,
        message: String,
    },

    /// Request never produced a usable response.
    #[error("{op} failed: {source}")]
    Transport {
        op: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP client setup failed: {0}")]
    Setup(#[source] reqwest::Error),

    #[error("Failed to parse payload: {0}")]
    Parse(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::AuthExpired => ErrorKind::AuthExpired,
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::Request { .. } | ClientError::Transport { .. } => ErrorKind::Network,
            ClientError::Parse(_) => ErrorKind::Parse,
            ClientError::Setup(_) | ClientError::Storage(_) | ClientError::Json(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Operation the error came from, for network failures.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            ClientError::Request { op, .. } | ClientError::Transport { op, .. } => Some(*op),
            _ => None,
        }
    }

    pub(crate) fn transport(op: Operation) -> impl FnOnce(reqwest::Error) -> ClientError {
        move |source| ClientError::Transport { op, source }
    }
}
