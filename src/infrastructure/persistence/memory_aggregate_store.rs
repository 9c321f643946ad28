//! In-process aggregate store for development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::increments::{AggregateCounter, Increments};
use crate::domain::repositories::{AggregateStore, StoreError};

/// Counters in a mutex-guarded map.
///
/// A whole batch is applied under one lock, so readers never observe a
/// partially applied call. Unlike the Postgres store, counters are created on
/// their first increment.
#[derive(Default)]
pub struct MemoryAggregateStore {
    counters: Mutex<HashMap<String, AggregateCounter>>,
}

impl MemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AggregateCounter>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current `total_hits` of a code, zero when unknown.
    pub fn total_hits(&self, short_code: &str) -> u64 {
        self.lock()
            .get(short_code)
            .map_or(0, |counter| counter.total_hits)
    }
}

#[async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn apply_increments(&self, increments: &Increments) -> Result<usize, StoreError> {
        let mut counters = self.lock();

        for (short_code, increment) in increments.iter() {
            counters
                .entry(short_code.to_string())
                .or_insert_with(|| AggregateCounter {
                    short_code: short_code.to_string(),
                    total_hits: 0,
                    last_accessed: None,
                })
                .apply(increment);
        }

        Ok(increments.len())
    }

    async fn counter(&self, short_code: &str) -> Result<Option<AggregateCounter>, StoreError> {
        Ok(self.lock().get(short_code).cloned())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
