//! Handler for health check endpoint.

use axum::{Json, extract::State, http::StatusCode};

use crate::api::dto::health::{CheckStatus, HealthChecks, HealthResponse, WorkerCheck};
use crate::state::AppState;

/// Returns service health status with component checks.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response Codes
///
/// - **200 OK**: All components healthy
/// - **503 Service Unavailable**: One or more components degraded
///
/// # Components Checked
///
/// 1. **Database**: Link store round-trip
/// 2. **Hit Queue**: Recorder open, queue reachable, current depth
/// 3. **Cache**: Backend ping
/// 4. **Worker**: Embedded hit worker alive and not draining
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "checks": {
///     "database": { "status": "ok", "message": "Connected" },
///     "hit_queue": { "status": "ok", "message": "Depth: 12, buffer free: 9988/10000" },
///     "cache": { "status": "ok", "message": "Cache reachable" },
///     "worker": { "status": "ok", "alive": true, "ready": true, "state": "idle", "stats": { ... } }
///   }
/// }
/// ```
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let (db_check, queue_check, cache_check) = tokio::join!(
        check_database(&state),
        check_hit_queue(&state),
        check_cache(&state),
    );
    let worker_check = check_worker(&state);

    let all_healthy = db_check.is_ok()
        && queue_check.is_ok()
        && cache_check.is_ok()
        && worker_check.is_healthy();

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: db_check,
            hit_queue: queue_check,
            cache: cache_check,
            worker: worker_check,
        },
    };

    if all_healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_database(state: &AppState) -> CheckStatus {
    if state.resolver.health_check().await {
        CheckStatus::ok("Connected")
    } else {
        CheckStatus::error("Database unreachable")
    }
}

/// Checks the recorder buffer and the durable queue behind it.
async fn check_hit_queue(state: &AppState) -> CheckStatus {
    if state.recorder.is_closed() {
        return CheckStatus::error("Hit recorder is closed");
    }

    if !state.queue.health_check().await {
        return CheckStatus::error("Hit queue unreachable");
    }

    let buffer = format!(
        "buffer free: {}/{}",
        state.recorder.capacity(),
        state.recorder.max_capacity()
    );

    match state.queue.len().await {
        Ok(depth) => CheckStatus::ok(format!("Depth: {}, {}", depth, buffer)),
        Err(e) => CheckStatus::error(format!("Hit queue error: {}", e)),
    }
}

async fn check_cache(state: &AppState) -> CheckStatus {
    if state.cache.health_check().await {
        CheckStatus::ok("Cache reachable")
    } else {
        CheckStatus::error("Cache connection failed")
    }
}

/// A process without an embedded worker (`serve --no-worker`) is healthy as
/// long as the standalone worker runs elsewhere.
fn check_worker(state: &AppState) -> WorkerCheck {
    match &state.worker {
        None => WorkerCheck {
            status: "not_embedded".to_string(),
            alive: false,
            ready: false,
            state: None,
            stats: None,
        },
        Some(worker) => {
            let alive = worker.is_alive();
            let ready = worker.is_ready();

            WorkerCheck {
                status: if alive { "ok" } else { "error" }.to_string(),
                alive,
                ready,
                state: Some(worker.state()),
                stats: Some(worker.stats()),
            }
        }
    }
}
