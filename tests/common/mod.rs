#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::ConnectInfo;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::Layer;

use shortener_hits::application::services::HitRecorder;
use shortener_hits::domain::hit_event::{ClientMetadata, HitEvent};
use shortener_hits::domain::hit_worker::{RetryPolicy, WorkerConfig, WorkerStatsSnapshot, WorkerStatus};
use shortener_hits::domain::increments::{AggregateCounter, Increments};
use shortener_hits::domain::repositories::{
    AggregateStore, AnalyticsStore, DailyHits, Dimension, DimensionCount, LinkResolver, StoreError,
};
use shortener_hits::infrastructure::analytics::MemoryAnalyticsStore;
use shortener_hits::infrastructure::cache::{CacheService, NullCache};
use shortener_hits::infrastructure::persistence::MemoryAggregateStore;
use shortener_hits::infrastructure::queue::{HitQueue, InMemoryQueue};
use shortener_hits::state::AppState;

pub fn hit(code: &str) -> HitEvent {
    HitEvent::new(code, ClientMetadata::default())
}

pub async fn enqueue_many(queue: &dyn HitQueue, code: &str, count: usize) {
    for _ in 0..count {
        queue.enqueue(hit(code)).await.unwrap();
    }
}

/// Worker settings with short timings for tests.
pub fn fast_worker_config(batch_size: usize) -> WorkerConfig {
    WorkerConfig {
        batch_size,
        flush_interval: Duration::from_millis(200),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        },
        store_timeout: Duration::from_secs(1),
        shutdown_grace: Duration::from_millis(500),
    }
}

/// Polls worker stats until `done` holds.
pub async fn wait_for_stats(status: &WorkerStatus, done: impl Fn(&WorkerStatsSnapshot) -> bool) {
    for _ in 0..2_000 {
        if done(&status.stats()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("worker stats never matched: {:?}", status.stats());
}

fn outage() -> StoreError {
    StoreError::Unavailable("simulated outage".to_string())
}

/// Aggregate store that fails its first `failures` calls and records the
/// increments of every successful one.
#[derive(Default)]
pub struct FlakyAggregateStore {
    inner: MemoryAggregateStore,
    failures: AtomicUsize,
    calls: AtomicUsize,
    applied: Mutex<Vec<Increments>>,
}

impl FlakyAggregateStore {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn applied(&self) -> Vec<Increments> {
        self.applied.lock().unwrap().clone()
    }

    pub fn total_hits(&self, code: &str) -> u64 {
        self.inner.total_hits(code)
    }
}

#[async_trait]
impl AggregateStore for FlakyAggregateStore {
    async fn apply_increments(&self, increments: &Increments) -> Result<usize, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(outage());
        }

        self.applied.lock().unwrap().push(increments.clone());
        self.inner.apply_increments(increments).await
    }

    async fn counter(&self, short_code: &str) -> Result<Option<AggregateCounter>, StoreError> {
        self.inner.counter(short_code).await
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Analytics store that fails its first `failures` appends.
#[derive(Default)]
pub struct FlakyAnalyticsStore {
    inner: MemoryAnalyticsStore,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyAnalyticsStore {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl AnalyticsStore for FlakyAnalyticsStore {
    async fn append_batch(&self, events: &[HitEvent]) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(outage());
        }

        self.inner.append_batch(events).await
    }

    async fn count_hits(&self, short_code: &str) -> Result<u64, StoreError> {
        self.inner.count_hits(short_code).await
    }

    async fn breakdown(
        &self,
        short_code: &str,
        dimension: Dimension,
        limit: usize,
    ) -> Result<Vec<DimensionCount>, StoreError> {
        self.inner.breakdown(short_code, dimension, limit).await
    }

    async fn daily_hits(&self, short_code: &str, days: u32) -> Result<Vec<DailyHits>, StoreError> {
        self.inner.daily_hits(short_code, days).await
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Fixed code to URL table.
#[derive(Default)]
pub struct StaticResolver {
    links: HashMap<String, String>,
    healthy: bool,
}

impl StaticResolver {
    pub fn new(links: &[(&str, &str)]) -> Self {
        Self {
            links: links
                .iter()
                .map(|(code, url)| (code.to_string(), url.to_string()))
                .collect(),
            healthy: true,
        }
    }

    pub fn unhealthy() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkResolver for StaticResolver {
    async fn resolve(&self, short_code: &str) -> Result<Option<String>, StoreError> {
        if !self.healthy {
            return Err(outage());
        }
        Ok(self.links.get(short_code).cloned())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

pub struct TestApp {
    pub state: AppState,
    pub queue: Arc<InMemoryQueue>,
    pub forwarder: JoinHandle<()>,
}

pub fn create_test_app(resolver: Arc<dyn LinkResolver>) -> TestApp {
    create_test_app_with_cache(resolver, Arc::new(NullCache::new()))
}

pub fn create_test_app_with_cache(
    resolver: Arc<dyn LinkResolver>,
    cache: Arc<dyn CacheService>,
) -> TestApp {
    let queue = Arc::new(InMemoryQueue::new(1_000));
    let (recorder, forwarder) =
        HitRecorder::spawn(queue.clone(), 100, Duration::from_millis(100));

    let state = AppState {
        resolver,
        cache,
        recorder,
        queue: queue.clone(),
        worker: None,
    };

    TestApp {
        state,
        queue,
        forwarder,
    }
}

/// Injects a fixed peer address, as `into_make_service_with_connect_info` would.
#[derive(Clone)]
pub struct MockConnectInfoLayer;

impl<S> Layer<S> for MockConnectInfoLayer {
    type Service = MockConnectInfoService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MockConnectInfoService { inner }
    }
}

#[derive(Clone)]
pub struct MockConnectInfoService<S> {
    inner: S,
}

impl<S, B> tower::Service<axum::http::Request<B>> for MockConnectInfoService<S>
where
    S: tower::Service<axum::http::Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: axum::http::Request<B>) -> Self::Future {
        let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        self.inner.call(req)
    }
}

pub async fn create_test_url(pool: &sqlx::PgPool, code: &str, url: &str) {
    sqlx::query("INSERT INTO urls (short_code, long_url) VALUES ($1, $2)")
        .bind(code)
        .bind(url)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn deactivate_url(pool: &sqlx::PgPool, code: &str) {
    sqlx::query("UPDATE urls SET is_active = FALSE WHERE short_code = $1")
        .bind(code)
        .execute(pool)
        .await
        .unwrap();
}
