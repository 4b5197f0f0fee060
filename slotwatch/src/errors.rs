use crate::db::errors::DbError;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Inventory provider unreachable, slow, or returned a malformed
    /// payload. Logged and skipped for the cycle; retried next cadence.
    #[error("Inventory fetch failed for {context}: {message}")]
    TransientFetch { context: String, message: String },

    /// A notification send or booking attempt failed. Retried with backoff
    /// up to the attempt cap, then recorded as failed in the ledger.
    #[error("Dispatch failed for {channel}: {message}")]
    TransientDispatch { channel: String, message: String },

    /// Missing credentials or endpoints for a configured channel.
    /// Fatal at startup, never per-cycle.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Database operation error. A `UniqueViolation` on ledger insert is
    /// the DataIntegrityError case: treated as "already notified" by
    /// callers, not surfaced.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error signals a benign duplicate (ledger uniqueness
    /// violation). The current dispatch attempt is abandoned silently.
    pub fn is_already_notified(&self) -> bool {
        matches!(self, Error::Database(DbError::UniqueViolation { .. }))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(DbError::from(err))
    }
}

/// Type alias for engine operation results
pub type Result<T> = std::result::Result<T, Error>;
