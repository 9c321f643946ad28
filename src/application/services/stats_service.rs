//! Per-link hit report built from the aggregate and analytics stores.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::domain::repositories::{
    AggregateStore, AnalyticsStore, DailyHits, Dimension, DimensionCount,
};
use crate::error::AppError;

/// Everything known about one short code's traffic.
///
/// `total_hits` comes from the aggregate counter; `raw_hits` and the breakdowns
/// come from the analytics store and may run ahead of it after a redelivery.
#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub short_code: String,
    pub total_hits: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub raw_hits: u64,
    pub devices: Vec<DimensionCount>,
    pub browsers: Vec<DimensionCount>,
    pub countries: Vec<DimensionCount>,
    pub referers: Vec<DimensionCount>,
    pub daily: Vec<DailyHits>,
}

/// Read-only statistics over the hit stores.
pub struct StatsService {
    aggregates: Arc<dyn AggregateStore>,
    analytics: Arc<dyn AnalyticsStore>,
}

impl StatsService {
    pub fn new(aggregates: Arc<dyn AggregateStore>, analytics: Arc<dyn AnalyticsStore>) -> Self {
        Self {
            aggregates,
            analytics,
        }
    }

    /// Builds the report for `short_code`.
    ///
    /// Breakdowns list at most `top` values; `days` bounds the daily series.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the code has no counter.
    /// Store failures map through `From<StoreError>`.
    pub async fn link_report(
        &self,
        short_code: &str,
        days: u32,
        top: usize,
    ) -> Result<LinkReport, AppError> {
        let counter = self
            .aggregates
            .counter(short_code)
            .await?
            .ok_or_else(|| {
                AppError::not_found("Short link not found", json!({ "code": short_code }))
            })?;

        let analytics = &self.analytics;
        let (raw_hits, devices, browsers, countries, referers, daily) = tokio::try_join!(
            analytics.count_hits(short_code),
            analytics.breakdown(short_code, Dimension::Device, top),
            analytics.breakdown(short_code, Dimension::Browser, top),
            analytics.breakdown(short_code, Dimension::Country, top),
            analytics.breakdown(short_code, Dimension::Referer, top),
            analytics.daily_hits(short_code, days),
        )?;

        Ok(LinkReport {
            short_code: counter.short_code,
            total_hits: counter.total_hits,
            last_accessed: counter.last_accessed,
            raw_hits,
            devices,
            browsers,
            countries,
            referers,
            daily,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::increments::AggregateCounter;
    use crate::domain::repositories::{MockAggregateStore, MockAnalyticsStore, StoreError};

    #[tokio::test]
    async fn test_link_report_combines_both_stores() {
        let mut aggregates = MockAggregateStore::new();
        aggregates
            .expect_counter()
            .times(1)
            .returning(|code| {
                assert_eq!(code, "abc12");
                Ok(Some(AggregateCounter {
                    short_code: code.to_string(),
                    total_hits: 42,
                    last_accessed: None,
                }))
            });

        let mut analytics = MockAnalyticsStore::new();
        analytics.expect_count_hits().returning(|_| Ok(43));
        analytics.expect_breakdown().returning(|_, dimension, _| {
            Ok(vec![DimensionCount {
                value: dimension.column().to_string(),
                hits: 1,
            }])
        });
        analytics.expect_daily_hits().returning(|_, _| Ok(Vec::new()));

        let service = StatsService::new(Arc::new(aggregates), Arc::new(analytics));
        let report = service.link_report("abc12", 7, 5).await.unwrap();

        assert_eq!(report.total_hits, 42);
        assert_eq!(report.raw_hits, 43);
        assert_eq!(report.devices[0].value, "device_type");
        assert_eq!(report.referers[0].value, "referer");
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let mut aggregates = MockAggregateStore::new();
        aggregates.expect_counter().returning(|_| Ok(None));

        let service = StatsService::new(Arc::new(aggregates), Arc::new(MockAnalyticsStore::new()));
        let result = service.link_report("missing", 7, 5).await;

        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_analytics_failure_propagates() {
        let mut aggregates = MockAggregateStore::new();
        aggregates.expect_counter().returning(|code| {
            Ok(Some(AggregateCounter {
                short_code: code.to_string(),
                total_hits: 1,
                last_accessed: None,
            }))
        });
        let mut analytics = MockAnalyticsStore::new();
        analytics
            .expect_count_hits()
            .returning(|_| Err(StoreError::Unavailable("down".to_string())));
        analytics.expect_breakdown().returning(|_, _, _| Ok(Vec::new()));
        analytics.expect_daily_hits().returning(|_, _| Ok(Vec::new()));

        let service = StatsService::new(Arc::new(aggregates), Arc::new(analytics));
        let result = service.link_report("abc12", 7, 5).await;

        assert!(matches!(result, Err(AppError::Unavailable { .. })));
    }
}
