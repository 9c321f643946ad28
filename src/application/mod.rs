//! Application layer services.
//!
//! # Available Services
//!
//! - [`services::hit_recorder::HitRecorder`] - Non-blocking hit capture for the redirect path
//! - [`services::stats_service::StatsService`] - Per-link hit reports over both stores

pub mod services;
