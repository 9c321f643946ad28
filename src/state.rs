//! Shared state injected into HTTP handlers.

use std::sync::Arc;

use crate::application::services::HitRecorder;
use crate::domain::hit_worker::WorkerStatus;
use crate::domain::repositories::LinkResolver;
use crate::infrastructure::cache::CacheService;
use crate::infrastructure::queue::HitQueue;

/// Handles shared by every request.
///
/// Cheap to clone: everything is behind an `Arc` or is itself a handle.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<dyn LinkResolver>,
    pub cache: Arc<dyn CacheService>,
    pub recorder: HitRecorder,
    pub queue: Arc<dyn HitQueue>,
    /// Status of the worker embedded in this process, if any.
    pub worker: Option<WorkerStatus>,
}
