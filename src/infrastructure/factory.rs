//! One-shot construction of every configured backend.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AnalyticsBackend, CacheBackend, Config, QueueBackend};
use crate::domain::repositories::{AggregateStore, AnalyticsStore, LinkResolver};
use crate::infrastructure::analytics::{
    ClickHouseAnalyticsStore, MemoryAnalyticsStore, SqliteAnalyticsStore,
};
use crate::infrastructure::cache::{CacheService, InMemoryCache, NullCache, RedisCache};
use crate::infrastructure::persistence::{PgAggregateStore, PgLinkResolver};
use crate::infrastructure::queue::{HitQueue, InMemoryQueue, RedisStreamQueue};

/// Backends selected by configuration, built once and shared by handle.
///
/// Nothing here is global: the server and the worker receive these handles
/// explicitly, and dropping them closes the underlying connections.
#[derive(Clone)]
pub struct Backends {
    pub pool: Arc<PgPool>,
    pub queue: Arc<dyn HitQueue>,
    pub cache: Arc<dyn CacheService>,
    pub aggregates: Arc<dyn AggregateStore>,
    pub analytics: Arc<dyn AnalyticsStore>,
    pub resolver: Arc<dyn LinkResolver>,
}

impl Backends {
    /// Connects every backend and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Fails if the database, the queue or the analytics store cannot be
    /// reached. An unreachable Redis cache only degrades caching.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = Arc::new(connect_database(config).await?);

        let queue = connect_queue(config).await?;
        let cache = connect_cache(config).await;
        let analytics = connect_analytics(config).await?;

        Ok(Self {
            aggregates: Arc::new(PgAggregateStore::new(pool.clone())),
            resolver: Arc::new(PgLinkResolver::new(pool.clone())),
            pool,
            queue,
            cache,
            analytics,
        })
    }
}

/// Opens the Postgres pool and runs migrations.
pub async fn connect_database(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}

pub async fn connect_queue(config: &Config) -> Result<Arc<dyn HitQueue>> {
    match config.queue_backend {
        QueueBackend::Memory => {
            info!(capacity = config.queue_capacity, "Hit queue: in-memory");
            Ok(Arc::new(InMemoryQueue::new(config.queue_capacity)))
        }
        QueueBackend::RedisStreams => {
            let redis_url = config
                .redis_url
                .as_deref()
                .context("QUEUE_BACKEND=redis_streams requires REDIS_URL")?;
            let queue = RedisStreamQueue::connect(redis_url, config.stream_queue_options())
                .await
                .context("Failed to connect hit queue")?;
            info!(stream = %config.queue_name, "Hit queue: Redis Streams");
            Ok(Arc::new(queue))
        }
    }
}

/// Builds the URL cache, falling back to [`NullCache`] if Redis is unreachable.
pub async fn connect_cache(config: &Config) -> Arc<dyn CacheService> {
    let ttl = config.cache_ttl();

    match (config.cache_backend, config.redis_url.as_deref()) {
        (CacheBackend::Redis, Some(redis_url)) => match RedisCache::connect(redis_url, ttl).await {
            Ok(redis) => {
                info!("Cache enabled (Redis)");
                Arc::new(redis)
            }
            Err(e) => {
                warn!("Failed to connect to Redis: {}. Using NullCache.", e);
                Arc::new(NullCache::new())
            }
        },
        (CacheBackend::Redis, None) => {
            warn!("CACHE_BACKEND=redis without REDIS_URL. Using NullCache.");
            Arc::new(NullCache::new())
        }
        (CacheBackend::Memory, _) => {
            info!("Cache enabled (in-memory)");
            Arc::new(InMemoryCache::new(ttl))
        }
        (CacheBackend::None, _) => {
            info!("Cache disabled (NullCache)");
            Arc::new(NullCache::new())
        }
    }
}

pub async fn connect_analytics(config: &Config) -> Result<Arc<dyn AnalyticsStore>> {
    match config.analytics_backend {
        AnalyticsBackend::Sqlite => {
            let store = SqliteAnalyticsStore::connect(&config.analytics_sqlite_url)
                .await
                .context("Failed to open SQLite analytics store")?;
            Ok(Arc::new(store))
        }
        AnalyticsBackend::ClickHouse => {
            let store = ClickHouseAnalyticsStore::connect(config.clickhouse_options())
                .await
                .context("Failed to connect to ClickHouse")?;
            Ok(Arc::new(store))
        }
        AnalyticsBackend::Memory => {
            warn!("Analytics store is in-memory; raw hits are lost on restart");
            Ok(Arc::new(MemoryAnalyticsStore::new()))
        }
    }
}
