//! Background worker that turns queued hit events into counter updates.
//!
//! The worker pulls [`Delivery`] batches from a [`HitQueue`], collapses them
//! into per-code [`Increments`], writes those to the [`AggregateStore`] and the
//! raw events to the [`AnalyticsStore`], and commits the queue only after both
//! writes succeeded.
//!
//! # Cycle
//!
//! ```text
//! Idle -> Collecting -> Flushing -> Committing -> Idle
//!                          |  ^
//!                          v  |
//!                        Retrying
//! ```
//!
//! On shutdown every state reports [`WorkerState::Draining`] until the
//! in-flight batch is committed or given up, then [`WorkerState::Stopped`].
//!
//! # Delivery Semantics
//!
//! At-least-once. Within a cycle a write that already succeeded is never
//! repeated, so in-cycle retries cannot double count. A batch that exhausts its
//! retry budget stays uncommitted and is redelivered; if its aggregate write had
//! gone through, the redelivery counts it a second time (exactly once more).

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::hit_event::HitEvent;
use crate::domain::increments::Increments;
use crate::domain::repositories::{AggregateStore, AnalyticsStore, StoreError};
use crate::infrastructure::queue::{Delivery, HitQueue, QueueError, QueuePosition};

/// Backoff between flush attempts of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per cycle, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// Doubles from `base_delay`, is capped at `max_delay` and scaled by a
    /// random factor in `[0.5, 1.5)`, never exceeding `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let max = self.max_delay.as_secs_f64();
        let capped = (self.base_delay.as_secs_f64() * 2f64.powi(exponent)).min(max);
        let jittered = capped * (0.5 + fastrand::f64());

        Duration::from_secs_f64(jittered.min(max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Worker tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Flush as soon as this many events are collected.
    pub batch_size: usize,
    /// Flush a partial batch once this long has passed since collection started.
    pub flush_interval: Duration,
    pub retry: RetryPolicy,
    /// Bound on every store and commit call.
    pub store_timeout: Duration,
    /// How long retries may continue once shutdown was requested.
    pub shutdown_grace: Duration,
}

impl WorkerConfig {
    /// Longest time one batch can stay delivered but uncommitted: a full
    /// collection window, every attempt timing out on both the writes and the
    /// commit, the backoff between attempts and the drain grace.
    pub fn max_batch_hold(&self) -> Duration {
        let attempts = self.retry.max_attempts.max(1);

        self.flush_interval
            .saturating_add(self.store_timeout.saturating_mul(2).saturating_mul(attempts))
            .saturating_add(self.retry.max_delay.saturating_mul(attempts - 1))
            .saturating_add(self.shutdown_grace)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            store_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Published worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Collecting,
    Flushing,
    Retrying,
    Committing,
    Draining,
    Stopped,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Flushing => "flushing",
            Self::Retrying => "retrying",
            Self::Committing => "committing",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running totals kept by the worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    flush_attempts: AtomicU64,
    flush_failures: AtomicU64,
    batches_committed: AtomicU64,
    events_committed: AtomicU64,
    exhausted_batches: AtomicU64,
    dequeue_errors: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Every flush attempt, retries included.
    pub flush_attempts: u64,
    /// Attempts that ended without a commit.
    pub flush_failures: u64,
    pub batches_committed: u64,
    pub events_committed: u64,
    /// Batches abandoned uncommitted after the retry budget ran out.
    pub exhausted_batches: u64,
    pub dequeue_errors: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            flush_attempts: self.flush_attempts.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            events_committed: self.events_committed.load(Ordering::Relaxed),
            exhausted_batches: self.exhausted_batches.load(Ordering::Relaxed),
            dequeue_errors: self.dequeue_errors.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable read side of a running worker, used by health checks.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    state: watch::Receiver<WorkerState>,
    stats: Arc<WorkerStats>,
}

impl WorkerStatus {
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// The worker task is still running.
    ///
    /// False once it stopped, panicked or was aborted.
    pub fn is_alive(&self) -> bool {
        self.state.has_changed().is_ok() && self.state() != WorkerState::Stopped
    }

    /// Alive and not shutting down.
    pub fn is_ready(&self) -> bool {
        self.is_alive() && self.state() != WorkerState::Draining
    }

    /// Waits until the worker reports `state`.
    ///
    /// Returns `false` if the worker ended first.
    pub async fn wait_for_state(&mut self, state: WorkerState) -> bool {
        self.state.wait_for(|current| *current == state).await.is_ok()
    }
}

/// Owner handle of a spawned worker.
pub struct WorkerHandle {
    status: WorkerStatus,
    shutdown: CancellationToken,
    task: JoinHandle<WorkerStatsSnapshot>,
}

impl WorkerHandle {
    pub fn status(&self) -> WorkerStatus {
        self.status.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// Requests a drain and waits for the worker to stop.
    ///
    /// The in-flight batch is flushed and committed first, unless its retries
    /// outlast [`WorkerConfig::shutdown_grace`], in which case it is left
    /// uncommitted for redelivery.
    pub async fn shutdown(self) -> WorkerStatsSnapshot {
        self.shutdown.cancel();

        match self.task.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Hit worker task failed");
                self.status.stats()
            }
        }
    }

    /// Stops the task immediately, as a crash would.
    ///
    /// Nothing is committed; the queue redelivers whatever was in flight.
    pub fn abort(self) {
        self.task.abort();
    }
}

enum CycleOutcome {
    Committed,
    Exhausted { aggregate_applied: bool },
    Interrupted { aggregate_applied: bool },
}

/// Batching hit consumer.
pub struct HitWorker {
    queue: Arc<dyn HitQueue>,
    aggregates: Arc<dyn AggregateStore>,
    analytics: Arc<dyn AnalyticsStore>,
    config: WorkerConfig,
    state: watch::Sender<WorkerState>,
    stats: Arc<WorkerStats>,
    shutdown: CancellationToken,
    /// Set at the first retry wait after shutdown was requested.
    drain_deadline: Option<Instant>,
}

impl HitWorker {
    /// Spawns the worker on the current runtime.
    pub fn spawn(
        queue: Arc<dyn HitQueue>,
        aggregates: Arc<dyn AggregateStore>,
        analytics: Arc<dyn AnalyticsStore>,
        config: WorkerConfig,
    ) -> WorkerHandle {
        let (state, state_rx) = watch::channel(WorkerState::Idle);
        let stats = Arc::new(WorkerStats::default());
        let shutdown = CancellationToken::new();

        let worker = Self {
            queue,
            aggregates,
            analytics,
            config,
            state,
            stats: stats.clone(),
            shutdown: shutdown.clone(),
            drain_deadline: None,
        };

        WorkerHandle {
            status: WorkerStatus {
                state: state_rx,
                stats,
            },
            shutdown,
            task: tokio::spawn(worker.run()),
        }
    }

    async fn run(mut self) -> WorkerStatsSnapshot {
        info!(
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            max_attempts = self.config.retry.max_attempts,
            "Hit worker started"
        );

        match self.queue.recover().await {
            Ok(0) => {}
            Ok(redelivered) => info!(redelivered, "Replaying uncommitted hit events"),
            Err(e) => warn!(error = %e, "Failed to rewind hit queue on startup"),
        }

        while !self.shutdown.is_cancelled() {
            self.set_state(WorkerState::Idle);

            let batch = self.collect().await;
            if batch.is_empty() {
                continue;
            }

            match self.flush_cycle(&batch).await {
                CycleOutcome::Committed => {}
                CycleOutcome::Exhausted { aggregate_applied } => {
                    error!(
                        events = batch.len(),
                        aggregate_applied,
                        "Hit batch exhausted its retry budget, leaving it uncommitted"
                    );
                    self.abandon().await;
                }
                CycleOutcome::Interrupted { aggregate_applied } => {
                    warn!(
                        events = batch.len(),
                        aggregate_applied,
                        "Shutdown grace elapsed, leaving hit batch uncommitted"
                    );
                    self.abandon().await;
                }
            }
        }

        self.set_state(WorkerState::Stopped);
        let snapshot = self.stats.snapshot();
        info!(
            batches = snapshot.batches_committed,
            events = snapshot.events_committed,
            exhausted = snapshot.exhausted_batches,
            "Hit worker stopped"
        );

        snapshot
    }

    fn set_state(&self, next: WorkerState) {
        let next = if self.shutdown.is_cancelled() && next != WorkerState::Stopped {
            WorkerState::Draining
        } else {
            next
        };

        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "Hit worker state");
            *current = next;
            true
        });
    }

    /// Gathers up to `batch_size` deliveries, returning early on the flush
    /// interval or on shutdown.
    async fn collect(&self) -> Vec<Delivery> {
        let batch_size = self.config.batch_size.max(1);
        let deadline = Instant::now() + self.config.flush_interval;
        let mut batch: Vec<Delivery> = Vec::with_capacity(batch_size);

        while batch.len() < batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = self.queue.dequeue_batch(batch_size - batch.len(), remaining) => result,
            };

            match result {
                Ok(deliveries) if deliveries.is_empty() => {}
                Ok(deliveries) => {
                    batch.extend(deliveries);
                    self.set_state(WorkerState::Collecting);
                }
                Err(e) => {
                    self.stats.dequeue_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Failed to dequeue hit events");

                    let pause = self.config.retry.base_delay.min(remaining);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = sleep(pause) => {}
                    }
                }
            }
        }

        batch
    }

    async fn flush_cycle(&mut self, batch: &[Delivery]) -> CycleOutcome {
        let events: Vec<HitEvent> = batch.iter().map(|d| d.event.clone()).collect();
        let increments = Increments::from_events(&events);
        let Some(up_to) = batch.iter().map(|d| d.position).max() else {
            return CycleOutcome::Committed;
        };

        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut aggregate_done = false;
        let mut analytics_done = false;

        for attempt in 1..=max_attempts {
            self.set_state(if attempt == 1 {
                WorkerState::Flushing
            } else {
                WorkerState::Retrying
            });
            self.stats.flush_attempts.fetch_add(1, Ordering::Relaxed);

            let (aggregate, analytics) = tokio::join!(
                async {
                    if aggregate_done {
                        Ok(())
                    } else {
                        self.apply_aggregates(&increments).await
                    }
                },
                async {
                    if analytics_done {
                        Ok(())
                    } else {
                        self.append_analytics(&events).await
                    }
                },
            );

            match aggregate {
                Ok(()) => aggregate_done = true,
                Err(e) => warn!(attempt, error = %e, "Aggregate write failed"),
            }
            match analytics {
                Ok(()) => analytics_done = true,
                Err(e) => warn!(attempt, error = %e, "Analytics write failed"),
            }

            if aggregate_done && analytics_done {
                self.set_state(WorkerState::Committing);
                match self.commit(up_to).await {
                    Ok(()) => {
                        self.stats.batches_committed.fetch_add(1, Ordering::Relaxed);
                        self.stats
                            .events_committed
                            .fetch_add(events.len() as u64, Ordering::Relaxed);
                        metrics::counter!("hits_committed_total").increment(events.len() as u64);
                        debug!(
                            events = events.len(),
                            codes = increments.len(),
                            up_to = %up_to,
                            attempt,
                            "Hit batch committed"
                        );
                        return CycleOutcome::Committed;
                    }
                    Err(e) => warn!(attempt, error = %e, "Queue commit failed"),
                }
            }

            self.stats.flush_failures.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("hits_flush_retries_total").increment(1);

            if attempt == max_attempts {
                break;
            }
            if !self.backoff(self.config.retry.delay_for(attempt)).await {
                return CycleOutcome::Interrupted {
                    aggregate_applied: aggregate_done,
                };
            }
        }

        CycleOutcome::Exhausted {
            aggregate_applied: aggregate_done,
        }
    }

    async fn apply_aggregates(&self, increments: &Increments) -> Result<(), StoreError> {
        let limit = self.config.store_timeout;
        let updated = timeout(limit, self.aggregates.apply_increments(increments))
            .await
            .map_err(|_| StoreError::Timeout(limit))??;

        debug!(codes = increments.len(), updated, "Aggregate counters updated");
        Ok(())
    }

    async fn append_analytics(&self, events: &[HitEvent]) -> Result<(), StoreError> {
        let limit = self.config.store_timeout;
        timeout(limit, self.analytics.append_batch(events))
            .await
            .map_err(|_| StoreError::Timeout(limit))?
    }

    async fn commit(&self, up_to: QueuePosition) -> Result<(), QueueError> {
        timeout(self.config.store_timeout, self.queue.commit(up_to))
            .await
            .map_err(|_| QueueError::Operation(format!("commit of {} timed out", up_to)))?
    }

    /// Waits `delay` before the next attempt.
    ///
    /// Returns `false` when shutdown was requested and the wait would end past
    /// the drain deadline.
    async fn backoff(&mut self, delay: Duration) -> bool {
        if !self.shutdown.is_cancelled() {
            tokio::select! {
                _ = sleep(delay) => return true,
                _ = self.shutdown.cancelled() => {}
            }
        }

        let grace = self.config.shutdown_grace;
        let deadline = *self
            .drain_deadline
            .get_or_insert_with(|| Instant::now() + grace);
        let wake = Instant::now() + delay;
        if wake > deadline {
            return false;
        }

        sleep_until(wake).await;
        true
    }

    /// Gives up on the current batch and rewinds the queue so it is redelivered.
    async fn abandon(&self) {
        self.stats.exhausted_batches.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("hits_flush_exhausted_total").increment(1);

        if let Err(e) = self.queue.recover().await {
            warn!(error = %e, "Failed to rewind hit queue");
        }

        if !self.shutdown.is_cancelled() {
            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = sleep(self.config.retry.max_delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hit_event::ClientMetadata;
    use crate::domain::repositories::{MockAggregateStore, MockAnalyticsStore};
    use crate::infrastructure::queue::InMemoryQueue;

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            batch_size: 10,
            flush_interval: Duration::from_millis(500),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
            },
            store_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_millis(200),
        }
    }

    async fn queue_with(code: &str, count: usize) -> Arc<InMemoryQueue> {
        let queue = Arc::new(InMemoryQueue::new(1_000));
        for _ in 0..count {
            queue
                .enqueue(HitEvent::new(code, ClientMetadata::default()))
                .await
                .unwrap();
        }
        queue
    }

    async fn wait_until(status: &WorkerStatus, done: impl Fn(&WorkerStatsSnapshot) -> bool) {
        for _ in 0..1_000 {
            if done(&status.stats()) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("worker never reached the expected stats: {:?}", status.stats());
    }

    #[test]
    fn test_retry_delay_is_capped_and_jittered() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };

        for _ in 0..100 {
            let first = policy.delay_for(1);
            assert!(first >= Duration::from_millis(50));
            assert!(first < Duration::from_millis(150));

            assert!(policy.delay_for(8) <= Duration::from_secs(1));
            assert!(policy.delay_for(u32::MAX) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn test_max_batch_hold_covers_worst_cycle() {
        // 500ms collect + 3 x (1s writes + 1s commit) + 2 x 50ms backoff + 200ms grace
        assert_eq!(test_config().max_batch_hold(), Duration::from_millis(6_800));

        let mut config = test_config();
        config.retry.max_attempts = u32::MAX;
        config.store_timeout = Duration::MAX;
        assert_eq!(config.max_batch_hold(), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_outage_recovers_without_double_count() {
        let queue = queue_with("abc12", 10).await;

        let mut aggregates = MockAggregateStore::new();
        let mut calls = 0;
        aggregates
            .expect_apply_increments()
            .times(3)
            .returning(move |increments| {
                calls += 1;
                assert_eq!(increments.get("abc12").map(|i| i.count), Some(10));
                if calls <= 2 {
                    Err(StoreError::Unavailable("connection refused".to_string()))
                } else {
                    Ok(increments.len())
                }
            });

        let mut analytics = MockAnalyticsStore::new();
        analytics
            .expect_append_batch()
            .times(1)
            .returning(|events| {
                assert_eq!(events.len(), 10);
                Ok(())
            });

        let handle = HitWorker::spawn(
            queue.clone(),
            Arc::new(aggregates),
            Arc::new(analytics),
            test_config(),
        );
        wait_until(&handle.status(), |s| s.batches_committed == 1).await;

        let stats = handle.shutdown().await;

        assert_eq!(stats.flush_attempts, 3);
        assert_eq!(stats.flush_failures, 2);
        assert_eq!(stats.events_committed, 10);
        assert_eq!(stats.exhausted_batches, 0);
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_batch_stays_uncommitted() {
        let queue = queue_with("abc12", 4).await;

        let mut aggregates = MockAggregateStore::new();
        aggregates
            .expect_apply_increments()
            .returning(|_| Err(StoreError::Unavailable("down".to_string())));

        let mut analytics = MockAnalyticsStore::new();
        analytics.expect_append_batch().returning(|_| Ok(()));

        let handle = HitWorker::spawn(
            queue.clone(),
            Arc::new(aggregates),
            Arc::new(analytics),
            test_config(),
        );
        wait_until(&handle.status(), |s| s.exhausted_batches >= 1).await;

        assert_eq!(queue.len().await.unwrap(), 4);
        assert!(handle.is_alive());

        let stats = handle.shutdown().await;
        assert_eq!(stats.batches_committed, 0);
        assert_eq!(queue.len().await.unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_flushed_after_interval() {
        let queue = queue_with("xyz89", 3).await;

        let mut aggregates = MockAggregateStore::new();
        aggregates
            .expect_apply_increments()
            .times(1)
            .returning(|increments| Ok(increments.len()));
        let mut analytics = MockAnalyticsStore::new();
        analytics.expect_append_batch().times(1).returning(|_| Ok(()));

        let started = Instant::now();
        let handle = HitWorker::spawn(
            queue.clone(),
            Arc::new(aggregates),
            Arc::new(analytics),
            test_config(),
        );
        wait_until(&handle.status(), |s| s.batches_committed == 1).await;

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(handle.shutdown().await.events_committed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_stopped_after_shutdown() {
        let queue = Arc::new(InMemoryQueue::new(10));
        let handle = HitWorker::spawn(
            queue,
            Arc::new(MockAggregateStore::new()),
            Arc::new(MockAnalyticsStore::new()),
            test_config(),
        );
        let status = handle.status();

        assert!(status.is_alive());
        assert!(status.is_ready());

        handle.shutdown().await;

        assert_eq!(status.state(), WorkerState::Stopped);
        assert!(!status.is_alive());
        assert!(!status.is_ready());
    }
}
