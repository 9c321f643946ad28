//! Infrastructure layer for external integrations.
//!
//! Concrete implementations of the domain store contracts plus the hit queue
//! and URL cache backends.
//!
//! # Modules
//!
//! - [`analytics`] - Raw hit storage (SQLite, ClickHouse, in-memory)
//! - [`cache`] - URL caching (Redis, in-memory and no-op implementations)
//! - [`factory`] - Resolves configured backends once at startup
//! - [`persistence`] - PostgreSQL aggregate counters and link lookup
//! - [`queue`] - Hit queues (in-memory, Redis Streams)

pub mod analytics;
pub mod cache;
pub mod factory;
pub mod persistence;
pub mod queue;
