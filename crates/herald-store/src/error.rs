//! Error types for the store.

use herald_pipeline::CollaboratorError;
use thiserror::Error;

/// Errors from the SQLite store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    /// The connection lock was poisoned by a panicking holder.
    #[error("database lock poisoned")]
    Poisoned,
}

impl From<StoreError> for CollaboratorError {
    fn from(e: StoreError) -> Self {
        CollaboratorError::Other(Box::new(e))
    }
}
