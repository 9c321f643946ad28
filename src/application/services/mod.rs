//! Services for the application layer.

pub mod hit_recorder;
pub mod stats_service;

pub use hit_recorder::HitRecorder;
pub use stats_service::{LinkReport, StatsService};
