//! Error types at the crate boundary

use std::fmt;

/// Category of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    Network,
    /// The server refused the change (validation, permissions)
    Rejected,
    NotFound,
    Unauthorized,
    Internal,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendErrorKind::Network => "Network error",
            BackendErrorKind::Rejected => "Rejected",
            BackendErrorKind::NotFound => "Not found",
            BackendErrorKind::Unauthorized => "Authentication required",
            BackendErrorKind::Internal => "Server error",
        };
        f.write_str(s)
    }
}

/// Failure payload of a bulk fetch or a point RPC
///
/// `message` is meant to be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Rejected, message)
    }

    /// Transient failures the caller's retry policy may retry
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Network | BackendErrorKind::Internal)
    }
}

impl From<anyhow::Error> for BackendError {
    fn from(e: anyhow::Error) -> Self {
        BackendError::new(BackendErrorKind::Internal, format!("{e:#}"))
    }
}

/// Why a raw push event was rejected at the router boundary
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("Event {event} is missing {field}")]
    MissingField { event: String, field: &'static str },

    #[error("Malformed {event} payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}
