//! Process runtime: HTTP server, embedded worker and graceful shutdown.

use crate::application::services::HitRecorder;
use crate::config::Config;
use crate::domain::hit_worker::{HitWorker, WorkerHandle};
use crate::infrastructure::factory::Backends;
use crate::routes::app_router;
use crate::state::AppState;

use anyhow::Result;
use axum::ServiceExt;
use axum::extract::Request;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;

/// Runs the HTTP server, optionally with an embedded hit worker.
///
/// Initializes:
/// - PostgreSQL connection pool and migrations
/// - Hit queue, cache and analytics backends
/// - Hit recorder (redirect side) and, if `embed_worker`, the hit worker
/// - Axum HTTP server
///
/// On Ctrl-C or SIGTERM the server stops accepting requests, in-flight
/// requests complete, the recorder buffer is drained into the queue and the
/// worker drains its last batch.
///
/// # Errors
///
/// Returns an error if:
/// - A required backend cannot be reached
/// - Server bind fails
/// - Server runtime error occurs
pub async fn run(config: Config, embed_worker: bool) -> Result<()> {
    let backends = Backends::from_config(&config).await?;

    let worker = embed_worker.then(|| spawn_worker(&backends, &config));
    if worker.is_none() {
        tracing::info!("Hit worker not embedded; run `worker` separately");
    }

    let (recorder, forwarder) = HitRecorder::spawn(
        backends.queue.clone(),
        config.hit_buffer_capacity,
        config.hit_enqueue_timeout(),
    );

    let state = AppState {
        resolver: backends.resolver.clone(),
        cache: backends.cache.clone(),
        recorder,
        queue: backends.queue.clone(),
        worker: worker.as_ref().map(WorkerHandle::status),
    };

    let app = app_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("HTTP server stopped, draining hit recorder");
    let grace = Duration::from_millis(config.hit_shutdown_grace_ms);
    match timeout(grace, forwarder).await {
        Ok(Ok(())) => tracing::debug!("Hit recorder drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "Hit forwarder task failed"),
        Err(_) => tracing::warn!(
            grace_ms = config.hit_shutdown_grace_ms,
            "Hit recorder did not drain in time"
        ),
    }

    if let Some(worker) = worker {
        let stats = worker.shutdown().await;
        tracing::info!(?stats, "Hit worker stopped");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Runs only the hit worker until Ctrl-C or SIGTERM.
///
/// Requires a shared queue backend (`redis_streams`); with the in-memory
/// queue there would be no producer.
///
/// # Errors
///
/// Returns an error if a required backend cannot be reached or the queue
/// backend is process-local.
pub async fn run_worker(config: Config) -> Result<()> {
    if config.queue_backend == crate::config::QueueBackend::Memory {
        anyhow::bail!("The standalone worker needs QUEUE_BACKEND=redis_streams");
    }

    let backends = Backends::from_config(&config).await?;
    let worker = spawn_worker(&backends, &config);

    shutdown_signal().await;

    let stats = worker.shutdown().await;
    tracing::info!(?stats, "Hit worker stopped");
    Ok(())
}

fn spawn_worker(backends: &Backends, config: &Config) -> WorkerHandle {
    HitWorker::spawn(
        backends.queue.clone(),
        backends.aggregates.clone(),
        backends.analytics.clone(),
        config.worker_config(),
    )
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}
