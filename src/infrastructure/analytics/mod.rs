//! Analytics store implementations.
//!
//! # Stores
//!
//! - [`SqliteAnalyticsStore`] - Embedded SQLite file, zero setup
//! - [`ClickHouseAnalyticsStore`] - Remote columnar store for high volume
//! - [`MemoryAnalyticsStore`] - In-process vector for development and tests

pub mod clickhouse_analytics_store;
pub mod memory_analytics_store;
pub mod sqlite_analytics_store;

pub use clickhouse_analytics_store::{ClickHouseAnalyticsStore, ClickHouseOptions};
pub use memory_analytics_store::MemoryAnalyticsStore;
pub use sqlite_analytics_store::SqliteAnalyticsStore;
