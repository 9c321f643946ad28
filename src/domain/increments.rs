//! Per-code pre-aggregation of a hit batch.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::domain::hit_event::HitEvent;

/// Increment to apply to one aggregate counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterIncrement {
    pub count: u64,
    /// Newest `occurred_at` among the grouped events.
    pub last_accessed: DateTime<Utc>,
}

/// Increments for every distinct short code of a batch.
///
/// Computed once per batch and retried verbatim. Codes iterate in sorted
/// order, so every writer updates counter rows in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Increments {
    by_code: BTreeMap<String, CounterIncrement>,
}

impl Increments {
    /// Groups events by short code, counting them and keeping the newest timestamp.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a HitEvent>,
    {
        let mut by_code: BTreeMap<String, CounterIncrement> = BTreeMap::new();

        for event in events {
            match by_code.entry(event.short_code.clone()) {
                Entry::Occupied(mut slot) => {
                    let increment = slot.get_mut();
                    increment.count += 1;
                    increment.last_accessed = increment.last_accessed.max(event.occurred_at);
                }
                Entry::Vacant(slot) => {
                    slot.insert(CounterIncrement {
                        count: 1,
                        last_accessed: event.occurred_at,
                    });
                }
            }
        }

        Self { by_code }
    }

    /// Number of distinct short codes.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Sum of all counts; equals the number of grouped events.
    pub fn total(&self) -> u64 {
        self.by_code.values().map(|inc| inc.count).sum()
    }

    pub fn get(&self, short_code: &str) -> Option<&CounterIncrement> {
        self.by_code.get(short_code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CounterIncrement)> {
        self.by_code.iter().map(|(code, inc)| (code.as_str(), inc))
    }
}

/// Aggregate counter row owned by the aggregate store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCounter {
    pub short_code: String,
    pub total_hits: u64,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl AggregateCounter {
    /// Applies an increment the way the stores do: add, then keep the newest timestamp.
    pub fn apply(&mut self, increment: &CounterIncrement) {
        self.total_hits = self.total_hits.saturating_add(increment.count);
        self.last_accessed = Some(match self.last_accessed {
            Some(current) => current.max(increment.last_accessed),
            None => increment.last_accessed,
        });
    }
}
