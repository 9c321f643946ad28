//! Analytics store contract: append-only raw hit events.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use super::StoreError;
use crate::domain::hit_event::HitEvent;

/// Client attribute a breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Device,
    Browser,
    Country,
    Referer,
}

impl Dimension {
    /// Column holding this attribute in the analytics tables.
    pub fn column(self) -> &'static str {
        match self {
            Self::Device => "device_type",
            Self::Browser => "browser",
            Self::Country => "country",
            Self::Referer => "referer",
        }
    }

    /// Reads this attribute from a hit.
    pub fn value_of(self, event: &HitEvent) -> Option<&str> {
        let client = &event.client;
        match self {
            Self::Device => client.device_type.as_deref(),
            Self::Browser => client.browser.as_deref(),
            Self::Country => client.country.as_deref(),
            Self::Referer => client.referer.as_deref(),
        }
    }
}

/// Bucket label for hits lacking the grouped attribute.
pub const UNKNOWN_BUCKET: &str = "unknown";

/// Hit count for one value of a [`Dimension`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionCount {
    pub value: String,
    pub hits: u64,
}

/// Hit count for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyHits {
    pub day: NaiveDate,
    pub hits: u64,
}

/// Append-only sink for raw hit events.
///
/// Independent failure domain from the [`super::AggregateStore`]. Events may be
/// appended more than once after a redelivery; readers that need exact numbers
/// deduplicate on [`HitEvent::dedup_key`].
///
/// # Implementations
///
/// - [`crate::infrastructure::analytics::SqliteAnalyticsStore`] - embedded SQLite file
/// - [`crate::infrastructure::analytics::ClickHouseAnalyticsStore`] - remote columnar store
/// - [`crate::infrastructure::analytics::MemoryAnalyticsStore`] - in-process vector
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Appends a batch of raw events.
    ///
    /// # Errors
    ///
    /// A failure of the call counts as a failure of the whole batch.
    async fn append_batch(&self, events: &[HitEvent]) -> Result<(), StoreError>;

    /// Counts raw events stored for a short code.
    async fn count_hits(&self, short_code: &str) -> Result<u64, StoreError>;

    /// Groups a code's hits by a client attribute, most frequent first.
    async fn breakdown(
        &self,
        short_code: &str,
        dimension: Dimension,
        limit: usize,
    ) -> Result<Vec<DimensionCount>, StoreError>;

    /// Daily hit counts over the last `days` days, oldest first.
    async fn daily_hits(&self, short_code: &str, days: u32) -> Result<Vec<DailyHits>, StoreError>;

    /// Checks whether the store is reachable.
    async fn health_check(&self) -> bool;
}
