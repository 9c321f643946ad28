//! Aggregate counter and link lookup implementations.
//!
//! # Stores
//!
//! - [`PgAggregateStore`] - Atomic batch increments on the `urls` table
//! - [`PgLinkResolver`] - Short code to long URL lookup
//! - [`MemoryAggregateStore`] - In-process counters for development and tests

pub mod memory_aggregate_store;
pub mod pg_aggregate_store;
pub mod pg_link_resolver;

pub use memory_aggregate_store::MemoryAggregateStore;
pub use pg_aggregate_store::PgAggregateStore;
pub use pg_link_resolver::PgLinkResolver;
