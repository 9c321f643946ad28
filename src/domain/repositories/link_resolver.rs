//! Short-code resolution consumed by the redirect handler.

use async_trait::async_trait;

use super::StoreError;

/// Resolves a short code to its long URL.
///
/// Owned by the link service; the hit pipeline only reads through it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Returns the long URL of an active link, or `None` if the code is unknown
    /// or inactive.
    async fn resolve(&self, short_code: &str) -> Result<Option<String>, StoreError>;

    /// Checks whether the backing store is reachable.
    async fn health_check(&self) -> bool;
}
