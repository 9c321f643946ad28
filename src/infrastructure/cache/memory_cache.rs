//! Process-local cache with per-entry TTL.

use super::service::{CacheResult, CacheService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Writes between sweeps of expired entries.
const SWEEP_EVERY: u32 = 256;

/// In-memory cache for single-process deployments and tests.
///
/// Expired entries are dropped when read, and swept every [`SWEEP_EVERY`]
/// writes so codes that are never read again do not accumulate.
pub struct InMemoryCache {
    inner: Mutex<Entries>,
    default_ttl: Duration,
}

#[derive(Default)]
struct Entries {
    urls: HashMap<String, (String, Instant)>,
    writes_since_sweep: u32,
}

impl InMemoryCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Entries::default()),
            default_ttl,
        }
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.lock().urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheService for InMemoryCache {
    async fn get_url(&self, short_code: &str) -> CacheResult<Option<String>> {
        let mut entries = self.lock();

        match entries.urls.get(short_code) {
            Some((url, expires_at)) if *expires_at > Instant::now() => Ok(Some(url.clone())),
            Some(_) => {
                entries.urls.remove(short_code);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_url(
        &self,
        short_code: &str,
        long_url: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let now = Instant::now();
        let expires_at = now + ttl.unwrap_or(self.default_ttl);
        let mut entries = self.lock();

        entries.writes_since_sweep += 1;
        if entries.writes_since_sweep >= SWEEP_EVERY {
            entries.urls.retain(|_, (_, expires_at)| *expires_at > now);
            entries.writes_since_sweep = 0;
        }

        entries
            .urls
            .insert(short_code.to_string(), (long_url.to_string(), expires_at));
        Ok(())
    }

    async fn invalidate(&self, short_code: &str) -> CacheResult<()> {
        self.lock().urls.remove(short_code);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
