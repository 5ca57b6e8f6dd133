//! Error types for the ferry core.

use thiserror::Error;

/// All possible errors surfaced by the replicator and the clock engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The replicator has been disposed; only `dispose` remains valid.
    #[error("replicator has been disposed")]
    Disposed,

    /// A remote timestamp is too far ahead of the local wall clock.
    #[error("remote clock drift of {drift}ms exceeds the {max_drift}ms bound")]
    TimeDrift { drift: u64, max_drift: u64 },

    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),
}

/// Errors reported by a [`LocalStore`](crate::LocalStore) implementation.
///
/// Failures to update the cell view are non-fatal to the caller: the
/// message stays in the log and the view catches up on a later merge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Errors reported by a [`RemoteStore`](crate::RemoteStore) implementation.
///
/// These are transient by contract: the replicator logs them and retries
/// on the next push or pull.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            Error::Disposed.to_string(),
            "replicator has been disposed"
        );

        let err = Error::TimeDrift {
            drift: 90_000,
            max_drift: 60_000,
        };
        assert_eq!(
            err.to_string(),
            "remote clock drift of 90000ms exceeds the 60000ms bound"
        );

        let err = Error::from(StoreError::TableNotFound("todos".into()));
        assert_eq!(err.to_string(), "local store error: table not found: todos");

        let err = Error::from(RemoteError::Transport("connection reset".into()));
        assert_eq!(
            err.to_string(),
            "remote store error: transport failure: connection reset"
        );
    }
}
