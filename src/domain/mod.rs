//! Domain layer: hit events, batch pre-aggregation, store contracts and the
//! hit worker.
//!
//! # Architecture
//!
//! - [`hit_event`] - Redirect occurrence carried through the queue
//! - [`increments`] - Per-code grouping of a batch
//! - [`repositories`] - Store trait definitions
//! - [`hit_worker`] - Batching consumer with retry and drain logic
//!
//! # Hit Processing Flow
//!
//! 1. The redirect handler builds a [`hit_event::HitEvent`]
//! 2. [`crate::application::services::HitRecorder`] enqueues it without blocking the response
//! 3. [`hit_worker::HitWorker`] dequeues batches and groups them into [`increments::Increments`]
//! 4. Counters go to [`repositories::AggregateStore`], raw events to [`repositories::AnalyticsStore`]
//! 5. The queue is committed once both writes succeeded

pub mod hit_event;
pub mod hit_worker;
pub mod increments;
pub mod repositories;
