use bridge_traits::{BridgeError, RemoteError, RemoteErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Local storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Collection {collection_uid} has dirty items but is not cached")]
    CollectionNotCached { collection_uid: String },

    #[error("Dirty item {item_uid} of collection {collection_uid} is not cached")]
    ItemNotCached {
        collection_uid: String,
        item_uid: String,
    },

    #[error("Sync already in progress for account {account}")]
    SyncInProgress { account: String },

    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// What a lenient `sync()` does with an error that reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Transient; log it and let a later sync retry.
    Suppress,
    /// Queue it for the user, then carry on.
    Record,
    /// Propagate to the caller.
    Fatal,
}

impl SyncError {
    /// Classify the error for the top-level sync boundary.
    ///
    /// Only remote errors are ever tolerated. Local storage and invariant
    /// failures are fatal.
    pub fn disposition(&self) -> ErrorDisposition {
        match self {
            SyncError::Remote(remote) => match remote.kind() {
                RemoteErrorKind::Network | RemoteErrorKind::TemporaryServer => {
                    ErrorDisposition::Suppress
                }
                RemoteErrorKind::PermissionDenied | RemoteErrorKind::Http => {
                    ErrorDisposition::Record
                }
                RemoteErrorKind::Unclassified => ErrorDisposition::Fatal,
            },
            _ => ErrorDisposition::Fatal,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            SyncError::Remote(remote) => Some(remote),
            _ => None,
        }
    }
}

impl From<core_runtime::Error> for SyncError {
    fn from(error: core_runtime::Error) -> Self {
        SyncError::InvalidConfig(error.to_string())
    }
}
