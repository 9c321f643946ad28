//! Redis-backed cache implementation.

use super::service::{CacheError, CacheResult, CacheService};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;
use tracing::{debug, info};

/// Redis cache of short code mappings, one `SETEX` key per code.
///
/// Uses a `ConnectionManager` for automatic reconnects; clones share the
/// multiplexed connection.
pub struct RedisCache {
    conn: ConnectionManager,
    default_ttl: Duration,
    key_prefix: String,
}

impl RedisCache {
    /// Connects to Redis, validates the connection with a PING, and sets the default TTL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Connection`] if the URL is invalid, the connection cannot
    /// be established, or the PING health check fails.
    pub async fn connect(redis_url: &str, default_ttl: Duration) -> CacheResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Connection(format!("Failed to create Redis client: {}", e)))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        conn.clone()
            .ping::<()>()
            .await
            .map_err(|e| CacheError::Connection(format!("Redis PING failed: {}", e)))?;

        info!(ttl_secs = default_ttl.as_secs(), "Cache connected to Redis");

        Ok(Self {
            conn,
            default_ttl,
            key_prefix: "short:".to_string(),
        })
    }

    fn build_key(&self, short_code: &str) -> String {
        format!("{}{}", self.key_prefix, short_code)
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get_url(&self, short_code: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let url: Option<String> = conn.get(self.build_key(short_code)).await?;

        debug!(short_code, hit = url.is_some(), "Cache lookup");
        Ok(url)
    }

    async fn set_url(
        &self,
        short_code: &str,
        long_url: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let ttl = ttl.unwrap_or(self.default_ttl).as_secs().max(1);
        let mut conn = self.conn.clone();

        conn.set_ex::<_, _, ()>(self.build_key(short_code), long_url, ttl)
            .await?;
        Ok(())
    }

    async fn invalidate(&self, short_code: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(self.build_key(short_code)).await?;

        if deleted > 0 {
            debug!(short_code, "Cache entry invalidated");
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        conn.ping::<()>().await.is_ok()
    }
}
