//! Aggregate store contract: per-code hit counters.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::increments::{AggregateCounter, Increments};

/// Primary store of per-code hit counters.
///
/// Counters are only ever mutated through [`AggregateStore::apply_increments`];
/// nothing sets an absolute value, so concurrent workers compose through the
/// store's atomic row increment alone.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgAggregateStore`] - PostgreSQL `urls` table
/// - [`crate::infrastructure::persistence::MemoryAggregateStore`] - in-process map
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Applies every increment of the batch atomically.
    ///
    /// Either all codes are updated or none are, from a reader's perspective.
    /// Codes without a counter row are skipped.
    ///
    /// # Returns
    ///
    /// The number of counters updated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write could not be applied; nothing was
    /// changed in that case.
    async fn apply_increments(&self, increments: &Increments) -> Result<usize, StoreError>;

    /// Reads the current counter for a short code.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(counter))` if the code exists
    /// - `Ok(None)` otherwise
    async fn counter(&self, short_code: &str) -> Result<Option<AggregateCounter>, StoreError>;

    /// Checks whether the store is reachable.
    async fn health_check(&self) -> bool;
}
