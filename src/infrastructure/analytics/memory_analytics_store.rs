//! In-process analytics store for development and tests.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::hit_event::HitEvent;
use crate::domain::repositories::{
    AnalyticsStore, DailyHits, Dimension, DimensionCount, StoreError, UNKNOWN_BUCKET,
};

/// Raw hits kept in a vector. Nothing is persisted.
#[derive(Default)]
pub struct MemoryAnalyticsStore {
    events: Mutex<Vec<HitEvent>>,
}

impl MemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HitEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored events, duplicates included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every stored event in append order.
    pub fn events(&self) -> Vec<HitEvent> {
        self.lock().clone()
    }
}

#[async_trait]
impl AnalyticsStore for MemoryAnalyticsStore {
    async fn append_batch(&self, events: &[HitEvent]) -> Result<(), StoreError> {
        self.lock().extend_from_slice(events);
        Ok(())
    }

    async fn count_hits(&self, short_code: &str) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|e| e.short_code == short_code)
            .count() as u64)
    }

    async fn breakdown(
        &self,
        short_code: &str,
        dimension: Dimension,
        limit: usize,
    ) -> Result<Vec<DimensionCount>, StoreError> {
        let mut buckets: HashMap<String, u64> = HashMap::new();
        for event in self.lock().iter().filter(|e| e.short_code == short_code) {
            let value = dimension.value_of(event).unwrap_or(UNKNOWN_BUCKET);
            *buckets.entry(value.to_string()).or_default() += 1;
        }

        let mut counts: Vec<DimensionCount> = buckets
            .into_iter()
            .map(|(value, hits)| DimensionCount { value, hits })
            .collect();
        counts.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.value.cmp(&b.value)));
        counts.truncate(limit);

        Ok(counts)
    }

    async fn daily_hits(&self, short_code: &str, days: u32) -> Result<Vec<DailyHits>, StoreError> {
        let since = Utc::now() - Duration::days(i64::from(days));

        let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for event in self
            .lock()
            .iter()
            .filter(|e| e.short_code == short_code && e.occurred_at >= since)
        {
            *by_day.entry(event.occurred_at.date_naive()).or_default() += 1;
        }

        Ok(by_day
            .into_iter()
            .map(|(day, hits)| DailyHits { day, hits })
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
