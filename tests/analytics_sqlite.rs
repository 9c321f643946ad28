use chrono::{Duration, Utc};

use shortener_hits::domain::hit_event::{ClientMetadata, HitEvent};
use shortener_hits::domain::repositories::{AnalyticsStore, Dimension, UNKNOWN_BUCKET};
use shortener_hits::infrastructure::analytics::SqliteAnalyticsStore;

async fn store() -> SqliteAnalyticsStore {
    SqliteAnalyticsStore::connect("sqlite::memory:").await.unwrap()
}

fn hit_from(code: &str, device: Option<&str>, country: Option<&str>) -> HitEvent {
    HitEvent::new(
        code,
        ClientMetadata {
            device_type: device.map(str::to_string),
            country: country.map(str::to_string),
            ..ClientMetadata::default()
        },
    )
}

#[tokio::test]
async fn test_append_batch_larger_than_one_insert() {
    let store = store().await;
    let events: Vec<HitEvent> = (0..250).map(|_| hit_from("abc12", None, None)).collect();

    store.append_batch(&events).await.unwrap();
    store.append_batch(&[hit_from("xyz89", None, None)]).await.unwrap();

    assert_eq!(store.count_hits("abc12").await.unwrap(), 250);
    assert_eq!(store.count_hits("xyz89").await.unwrap(), 1);
    assert_eq!(store.count_hits("missing").await.unwrap(), 0);
}

#[tokio::test]
async fn test_append_empty_batch_is_noop() {
    let store = store().await;

    store.append_batch(&[]).await.unwrap();

    assert_eq!(store.count_hits("abc12").await.unwrap(), 0);
}

#[tokio::test]
async fn test_breakdown_orders_and_buckets_missing_values() {
    let store = store().await;
    let events = vec![
        hit_from("abc12", Some("mobile"), Some("DE")),
        hit_from("abc12", Some("mobile"), Some("DE")),
        hit_from("abc12", Some("desktop"), None),
        hit_from("abc12", None, Some("FR")),
        hit_from("abc12", Some("tablet"), Some("FR")),
        hit_from("xyz89", Some("bot"), None),
    ];
    store.append_batch(&events).await.unwrap();

    let devices = store.breakdown("abc12", Dimension::Device, 10).await.unwrap();
    let devices: Vec<(&str, u64)> = devices.iter().map(|d| (d.value.as_str(), d.hits)).collect();
    assert_eq!(
        devices,
        vec![("mobile", 2), ("desktop", 1), ("tablet", 1), (UNKNOWN_BUCKET, 1)]
    );

    let countries = store.breakdown("abc12", Dimension::Country, 2).await.unwrap();
    let countries: Vec<(&str, u64)> = countries.iter().map(|c| (c.value.as_str(), c.hits)).collect();
    assert_eq!(countries, vec![("DE", 2), ("FR", 2)]);
}

#[tokio::test]
async fn test_daily_hits_within_range() {
    let store = store().await;
    let now = Utc::now();
    let events = vec![
        HitEvent::at("abc12", now, ClientMetadata::default()),
        HitEvent::at("abc12", now, ClientMetadata::default()),
        HitEvent::at("abc12", now - Duration::days(2), ClientMetadata::default()),
        HitEvent::at("abc12", now - Duration::days(40), ClientMetadata::default()),
    ];
    store.append_batch(&events).await.unwrap();

    let daily = store.daily_hits("abc12", 7).await.unwrap();

    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0].day, (now - Duration::days(2)).date_naive());
    assert_eq!(daily[0].hits, 1);
    assert_eq!(daily[1].day, now.date_naive());
    assert_eq!(daily[1].hits, 2);
}

#[tokio::test]
async fn test_health_check() {
    let store = store().await;

    assert!(store.health_check().await);
}
