//! Error types for the result store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while writing scenario results.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("failed to create schema: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("failed to insert row: {0}")]
    Insert(#[source] rusqlite::Error),

    #[error("transaction error: {0}")]
    Transaction(#[source] rusqlite::Error),
}
