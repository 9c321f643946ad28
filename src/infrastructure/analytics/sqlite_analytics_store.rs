//! Embedded SQLite analytics store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::info;

use crate::domain::hit_event::HitEvent;
use crate::domain::repositories::{
    AnalyticsStore, DailyHits, Dimension, DimensionCount, StoreError, UNKNOWN_BUCKET,
};

/// Rows per INSERT statement; eight binds each stays under SQLite's 999 limit.
const INSERT_CHUNK: usize = 100;

/// Raw hits in a local SQLite file.
///
/// Zero-setup backend for development and low-traffic deployments. The
/// `url_hits` table is created on connect; `occurred_at` is stored as epoch
/// milliseconds.
pub struct SqliteAnalyticsStore {
    pool: SqlitePool,
}

impl SqliteAnalyticsStore {
    /// Opens (creating if missing) the database at `url` and ensures the schema.
    ///
    /// `sqlite::memory:` gives a private in-memory database backed by a single
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the file cannot be opened or the
    /// schema cannot be created.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!(url, "SQLite analytics store ready");

        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS url_hits (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                short_code  TEXT NOT NULL,
                occurred_at INTEGER NOT NULL,
                ip_address  TEXT,
                user_agent  TEXT,
                referer     TEXT,
                country     TEXT,
                device_type TEXT,
                browser     TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_url_hits_code_time ON url_hits (short_code, occurred_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for SqliteAnalyticsStore {
    async fn append_batch(&self, events: &[HitEvent]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in events.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO url_hits (short_code, occurred_at, ip_address, user_agent, referer, country, device_type, browser) ",
            );
            builder.push_values(chunk, |mut row, event| {
                let client = &event.client;
                row.push_bind(&event.short_code)
                    .push_bind(event.occurred_at.timestamp_millis())
                    .push_bind(&client.ip_address)
                    .push_bind(&client.user_agent)
                    .push_bind(&client.referer)
                    .push_bind(&client.country)
                    .push_bind(&client.device_type)
                    .push_bind(&client.browser);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn count_hits(&self, short_code: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM url_hits WHERE short_code = ?")
            .bind(short_code)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn breakdown(
        &self,
        short_code: &str,
        dimension: Dimension,
        limit: usize,
    ) -> Result<Vec<DimensionCount>, StoreError> {
        let sql = format!(
            r#"
            SELECT COALESCE({column}, ?) AS value, COUNT(*) AS hits
            FROM url_hits
            WHERE short_code = ?
            GROUP BY value
            ORDER BY hits DESC, value ASC
            LIMIT ?
            "#,
            column = dimension.column()
        );

        let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
            .bind(UNKNOWN_BUCKET)
            .bind(short_code)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(value, hits)| DimensionCount {
                value,
                hits: hits.max(0) as u64,
            })
            .collect())
    }

    async fn daily_hits(&self, short_code: &str, days: u32) -> Result<Vec<DailyHits>, StoreError> {
        let since: DateTime<Utc> = Utc::now() - Duration::days(i64::from(days));

        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT date(occurred_at / 1000, 'unixepoch') AS day, COUNT(*) AS hits
            FROM url_hits
            WHERE short_code = ? AND occurred_at >= ?
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(short_code)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(day, hits)| {
                let day = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map_err(|e| StoreError::Backend(format!("invalid day '{}': {}", day, e)))?;
                Ok(DailyHits {
                    day,
                    hits: hits.max(0) as u64,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
