//! DTOs for health check endpoint.

use serde::Serialize;

use crate::domain::hit_worker::{WorkerState, WorkerStatsSnapshot};

/// Health check response with component status.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

/// Health status for each system component.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: CheckStatus,
    pub hit_queue: CheckStatus,
    pub cache: CheckStatus,
    pub worker: WorkerCheck,
}

/// Individual component health status.
#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Liveness and progress of the embedded hit worker.
#[derive(Debug, Serialize)]
pub struct WorkerCheck {
    pub status: String,
    pub alive: bool,
    pub ready: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<WorkerState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<WorkerStatsSnapshot>,
}

impl WorkerCheck {
    /// `not_embedded` counts as healthy: the worker runs in another process.
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "ok" | "not_embedded")
    }
}
