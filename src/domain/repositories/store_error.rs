//! Error type shared by the aggregate, analytics and link stores.

use std::time::Duration;
use thiserror::Error;

/// Failure of a store call.
///
/// Every variant is treated as transient by the hit worker: the batch stays
/// uncommitted and is retried or redelivered.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("analytics backend error: {0}")]
    Backend(String),
}

impl From<clickhouse::error::Error> for StoreError {
    fn from(e: clickhouse::error::Error) -> Self {
        Self::Backend(e.to_string())
    }
}
