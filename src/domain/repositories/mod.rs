//! Store trait definitions for the domain layer.
//!
//! These traits abstract every store the hit pipeline talks to. Concrete
//! backends live in `crate::infrastructure` and are chosen once at startup by
//! [`crate::infrastructure::factory::Backends`].
//!
//! # Available Contracts
//!
//! - [`AggregateStore`] - Per-code counters, atomic batch increments
//! - [`AnalyticsStore`] - Append-only raw hit events
//! - [`LinkResolver`] - Short code to long URL lookup
//!
//! # Testing
//!
//! Mock implementations are generated via `mockall` for unit tests.

pub mod aggregate_store;
pub mod analytics_store;
pub mod link_resolver;
pub mod store_error;

pub use aggregate_store::AggregateStore;
pub use analytics_store::{AnalyticsStore, DailyHits, Dimension, DimensionCount, UNKNOWN_BUCKET};
pub use link_resolver::LinkResolver;
pub use store_error::StoreError;

#[cfg(test)]
pub use aggregate_store::MockAggregateStore;
#[cfg(test)]
pub use analytics_store::MockAnalyticsStore;
#[cfg(test)]
pub use link_resolver::MockLinkResolver;
