//! # Shortener Hits
//!
//! Hit counting for a URL shortener: redirects record hits without waiting on
//! storage, a durable queue carries them, and a batching worker turns them into
//! per-link counters and raw analytics rows.
//!
//! ## Architecture
//!
//! - **Domain Layer** ([`domain`]) - Hit events, increments, store traits and the hit worker
//! - **Application Layer** ([`application`]) - Hit recorder and link reports
//! - **Infrastructure Layer** ([`infrastructure`]) - Queue, cache, Postgres and analytics backends
//! - **API Layer** ([`api`]) - Redirect and health handlers
//!
//! ## Hit Flow
//!
//! ```text
//! GET /{code} -> HitRecorder -> HitQueue -> HitWorker -> AggregateStore
//!                                                     \-> AnalyticsStore
//! ```
//!
//! Delivery is at-least-once: the queue is committed only after both stores
//! accepted a batch.
//!
//! ## Configuration
//!
//! Service configuration is loaded from environment variables via [`config::Config`].
//! See [`config`] module for available options.

pub mod api;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod state;
pub mod utils;

pub mod config;
pub mod server;

pub mod routes;

pub use error::AppError;
pub use state::AppState;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::application::services::{HitRecorder, LinkReport, StatsService};
    pub use crate::domain::hit_event::{ClientMetadata, HitEvent};
    pub use crate::domain::hit_worker::{
        HitWorker, RetryPolicy, WorkerConfig, WorkerHandle, WorkerState, WorkerStatus,
    };
    pub use crate::error::AppError;
    pub use crate::infrastructure::queue::{HitQueue, InMemoryQueue};
    pub use crate::state::AppState;
}
