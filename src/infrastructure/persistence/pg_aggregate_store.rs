//! PostgreSQL implementation of the aggregate store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::increments::{AggregateCounter, Increments};
use crate::domain::repositories::{AggregateStore, StoreError};

/// Hit counters kept on the `urls` table.
///
/// Each call runs one transaction with one `UPDATE ... SET total_hits =
/// total_hits + n` per distinct code. The row update is the only
/// synchronization between concurrent workers; nothing is read before it is
/// written.
pub struct PgAggregateStore {
    pool: Arc<PgPool>,
}

impl PgAggregateStore {
    /// Creates a new store with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AggregateStore for PgAggregateStore {
    async fn apply_increments(&self, increments: &Increments) -> Result<usize, StoreError> {
        if increments.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;

        for (short_code, increment) in increments.iter() {
            let result = sqlx::query(
                r#"
                UPDATE urls
                SET total_hits = total_hits + $2,
                    last_accessed = GREATEST(last_accessed, $3)
                WHERE short_code = $1
                "#,
            )
            .bind(short_code)
            .bind(i64::try_from(increment.count).unwrap_or(i64::MAX))
            .bind(increment.last_accessed)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                warn!(short_code, count = increment.count, "Hits for unknown short code skipped");
                metrics::counter!("hits_unknown_code_total").increment(increment.count);
            } else {
                updated += 1;
            }
        }

        tx.commit().await?;
        debug!(codes = increments.len(), updated, "Applied hit increments");

        Ok(updated)
    }

    async fn counter(&self, short_code: &str) -> Result<Option<AggregateCounter>, StoreError> {
        let row: Option<(String, i64, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT short_code, total_hits, last_accessed
            FROM urls
            WHERE short_code = $1
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|(short_code, total_hits, last_accessed)| AggregateCounter {
            short_code,
            total_hits: u64::try_from(total_hits).unwrap_or(0),
            last_accessed,
        }))
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .is_ok()
    }
}
