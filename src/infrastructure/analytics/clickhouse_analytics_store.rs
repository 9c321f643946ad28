//! ClickHouse analytics store for high-volume deployments.

use async_trait::async_trait;
use chrono::NaiveDate;
use clickhouse::{Client, Row};
use clickhouse::insert::Insert;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::hit_event::HitEvent;
use crate::domain::repositories::{
    AnalyticsStore, DailyHits, Dimension, DimensionCount, StoreError, UNKNOWN_BUCKET,
};

/// Connection settings for [`ClickHouseAnalyticsStore`].
#[derive(Debug, Clone)]
pub struct ClickHouseOptions {
    /// Server URL (e.g., "http://localhost:8123")
    pub url: String,
    pub database: String,
    pub table: String,
}

/// Row layout of the hits table.
#[derive(Debug, Clone, Serialize, Row)]
struct HitRow {
    short_code: String,
    /// `DateTime64(3)`, epoch milliseconds.
    occurred_at: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
    referer: Option<String>,
    country: Option<String>,
    device_type: Option<String>,
    browser: Option<String>,
}

impl From<&HitEvent> for HitRow {
    fn from(event: &HitEvent) -> Self {
        let client = event.client.clone();
        Self {
            short_code: event.short_code.clone(),
            occurred_at: event.occurred_at.timestamp_millis(),
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            referer: client.referer,
            country: client.country,
            device_type: client.device_type,
            browser: client.browser,
        }
    }
}

#[derive(Debug, Deserialize, Row)]
struct CountRow {
    count: u64,
}

#[derive(Debug, Deserialize, Row)]
struct BucketRow {
    value: String,
    hits: u64,
}

#[derive(Debug, Deserialize, Row)]
struct DayRow {
    day: String,
    hits: u64,
}

/// Raw hits in a ClickHouse `MergeTree` table.
///
/// The table is created on connect if missing and ordered by
/// `(short_code, occurred_at)`, which serves every query below.
pub struct ClickHouseAnalyticsStore {
    client: Client,
    table: String,
}

impl ClickHouseAnalyticsStore {
    /// Creates the client and ensures the hits table exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if ClickHouse is unreachable or the
    /// table cannot be created.
    pub async fn connect(options: ClickHouseOptions) -> Result<Self, StoreError> {
        let client = Client::default()
            .with_url(&options.url)
            .with_database(&options.database);

        let store = Self {
            client,
            table: options.table,
        };
        store.ensure_table().await?;

        info!(
            url = %options.url,
            database = %options.database,
            table = %store.table,
            "ClickHouse analytics store ready"
        );

        Ok(store)
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} ( \
                short_code String, \
                occurred_at DateTime64(3, 'UTC'), \
                ip_address Nullable(String), \
                user_agent Nullable(String), \
                referer Nullable(String), \
                country Nullable(String), \
                device_type Nullable(String), \
                browser Nullable(String) \
             ) ENGINE = MergeTree \
             PARTITION BY toYYYYMM(occurred_at) \
             ORDER BY (short_code, occurred_at)",
            table = self.table
        );

        self.client.query(&ddl).execute().await?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for ClickHouseAnalyticsStore {
    async fn append_batch(&self, events: &[HitEvent]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut insert: Insert<HitRow> = self.client.insert(&self.table)?;
        for event in events {
            insert.write(&HitRow::from(event)).await?;
        }
        insert.end().await?;

        Ok(())
    }

    async fn count_hits(&self, short_code: &str) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT count() AS count FROM {} WHERE short_code = ?",
            self.table
        );

        let row = self
            .client
            .query(&sql)
            .bind(short_code)
            .fetch_optional::<CountRow>()
            .await?;

        Ok(row.map_or(0, |r| r.count))
    }

    async fn breakdown(
        &self,
        short_code: &str,
        dimension: Dimension,
        limit: usize,
    ) -> Result<Vec<DimensionCount>, StoreError> {
        let sql = format!(
            "SELECT ifNull({column}, ?) AS value, count() AS hits \
             FROM {table} \
             WHERE short_code = ? \
             GROUP BY value \
             ORDER BY hits DESC, value ASC \
             LIMIT ?",
            column = dimension.column(),
            table = self.table
        );

        let rows = self
            .client
            .query(&sql)
            .bind(UNKNOWN_BUCKET)
            .bind(short_code)
            .bind(limit as u64)
            .fetch_all::<BucketRow>()
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| DimensionCount {
                value: r.value,
                hits: r.hits,
            })
            .collect())
    }

    async fn daily_hits(&self, short_code: &str, days: u32) -> Result<Vec<DailyHits>, StoreError> {
        let sql = format!(
            "SELECT toString(toDate(occurred_at)) AS day, count() AS hits \
             FROM {table} \
             WHERE short_code = ? AND occurred_at >= now64(3) - toIntervalDay(?) \
             GROUP BY day \
             ORDER BY day",
            table = self.table
        );

        let rows = self
            .client
            .query(&sql)
            .bind(short_code)
            .bind(days)
            .fetch_all::<DayRow>()
            .await?;

        rows.into_iter()
            .map(|r| {
                let day = NaiveDate::parse_from_str(&r.day, "%Y-%m-%d")
                    .map_err(|e| StoreError::Backend(format!("invalid day '{}': {}", r.day, e)))?;
                Ok(DailyHits { day, hits: r.hits })
            })
            .collect()
    }

    async fn health_check(&self) -> bool {
        self.client.query("SELECT 1").execute().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hit_event::ClientMetadata;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_row_from_event_keeps_metadata() {
        let at = Utc.with_ymd_and_hms(2025, 10, 29, 10, 30, 0).unwrap();
        let event = HitEvent::at(
            "abc12",
            at,
            ClientMetadata {
                country: Some("DE".to_string()),
                browser: Some("Firefox".to_string()),
                ..Default::default()
            },
        );

        let row = HitRow::from(&event);

        assert_eq!(row.short_code, "abc12");
        assert_eq!(row.occurred_at, at.timestamp_millis());
        assert_eq!(row.country.as_deref(), Some("DE"));
        assert_eq!(row.browser.as_deref(), Some("Firefox"));
        assert!(row.referer.is_none());
    }
}
