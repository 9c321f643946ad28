//! PostgreSQL short code resolution.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::repositories::{LinkResolver, StoreError};

/// Reads active links from the `urls` table.
pub struct PgLinkResolver {
    pool: Arc<PgPool>,
}

impl PgLinkResolver {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkResolver for PgLinkResolver {
    async fn resolve(&self, short_code: &str) -> Result<Option<String>, StoreError> {
        let long_url: Option<String> = sqlx::query_scalar(
            r#"
            SELECT long_url
            FROM urls
            WHERE short_code = $1 AND is_active
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(long_url)
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .is_ok()
    }
}
