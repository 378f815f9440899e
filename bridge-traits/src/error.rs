use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised by local storage bridges (cache, token store, dirty tracker).
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures raised by the remote collection/item store.
///
/// The remote store is a library boundary, so every failure it can produce is
/// folded into this closed set. Adapters map their transport and protocol
/// errors onto the closest variant and fall back to [`RemoteError::Unclassified`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server temporarily unavailable: {0}")]
    TemporaryServer(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Remote store error: {0}")]
    Unclassified(String),
}

/// Fieldless discriminant of [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    Network,
    TemporaryServer,
    PermissionDenied,
    Http,
    Unclassified,
}

impl RemoteError {
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            RemoteError::Network(_) => RemoteErrorKind::Network,
            RemoteError::TemporaryServer(_) => RemoteErrorKind::TemporaryServer,
            RemoteError::PermissionDenied(_) => RemoteErrorKind::PermissionDenied,
            RemoteError::Http { .. } => RemoteErrorKind::Http,
            RemoteError::Unclassified(_) => RemoteErrorKind::Unclassified,
        }
    }

    /// Map an HTTP status onto the taxonomy.
    ///
    /// 401/403 are permission problems, 502/503/504 are temporary, anything
    /// else is a generic HTTP error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RemoteError::PermissionDenied(message),
            502..=504 => RemoteError::TemporaryServer(message),
            _ => RemoteError::Http { status, message },
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
