mod common;

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use shortener_hits::domain::hit_event::{ClientMetadata, HitEvent};
use shortener_hits::domain::increments::Increments;
use shortener_hits::domain::repositories::{AggregateStore, LinkResolver};
use shortener_hits::infrastructure::persistence::{PgAggregateStore, PgLinkResolver};

fn hits_at(code: &str, minutes: &[u32]) -> Vec<HitEvent> {
    minutes
        .iter()
        .map(|m| {
            let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, *m, 0).unwrap();
            HitEvent::at(code, at, ClientMetadata::default())
        })
        .collect()
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn test_apply_increments_updates_counters(pool: PgPool) {
    let store = PgAggregateStore::new(Arc::new(pool.clone()));
    common::create_test_url(&pool, "abc12", "https://example.com/a").await;
    common::create_test_url(&pool, "xyz89", "https://example.com/x").await;

    let mut events = hits_at("abc12", &[10, 30, 20]);
    events.extend(hits_at("xyz89", &[5]));
    let updated = store
        .apply_increments(&Increments::from_events(&events))
        .await
        .unwrap();

    assert_eq!(updated, 2);

    let abc = store.counter("abc12").await.unwrap().unwrap();
    assert_eq!(abc.total_hits, 3);
    assert_eq!(abc.last_accessed, Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()));

    let xyz = store.counter("xyz89").await.unwrap().unwrap();
    assert_eq!(xyz.total_hits, 1);
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn test_last_accessed_never_moves_backwards(pool: PgPool) {
    let store = PgAggregateStore::new(Arc::new(pool.clone()));
    common::create_test_url(&pool, "abc12", "https://example.com").await;

    let newer = hits_at("abc12", &[45]);
    let older = hits_at("abc12", &[15, 16]);
    store.apply_increments(&Increments::from_events(&newer)).await.unwrap();
    store.apply_increments(&Increments::from_events(&older)).await.unwrap();

    let counter = store.counter("abc12").await.unwrap().unwrap();
    assert_eq!(counter.total_hits, 3);
    assert_eq!(counter.last_accessed, Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 45, 0).unwrap()));
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn test_unknown_codes_are_skipped(pool: PgPool) {
    let store = PgAggregateStore::new(Arc::new(pool.clone()));
    common::create_test_url(&pool, "abc12", "https://example.com").await;

    let mut events = hits_at("abc12", &[1]);
    events.extend(hits_at("ghost", &[2, 3]));
    let updated = store
        .apply_increments(&Increments::from_events(&events))
        .await
        .unwrap();

    assert_eq!(updated, 1);
    assert!(store.counter("ghost").await.unwrap().is_none());
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn test_concurrent_increments_compose(pool: PgPool) {
    let store = Arc::new(PgAggregateStore::new(Arc::new(pool.clone())));
    common::create_test_url(&pool, "abc12", "https://example.com").await;

    let batch = Increments::from_events(&hits_at("abc12", &[1, 2, 3, 4, 5]));
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let batch = batch.clone();
            tokio::spawn(async move { store.apply_increments(&batch).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let counter = store.counter("abc12").await.unwrap().unwrap();
    assert_eq!(counter.total_hits, 40);
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL server (DATABASE_URL)"]
async fn test_resolver_skips_inactive_links(pool: PgPool) {
    let resolver = PgLinkResolver::new(Arc::new(pool.clone()));
    common::create_test_url(&pool, "live", "https://example.com/live").await;
    common::create_test_url(&pool, "gone", "https://example.com/gone").await;
    common::deactivate_url(&pool, "gone").await;

    assert_eq!(
        resolver.resolve("live").await.unwrap().as_deref(),
        Some("https://example.com/live")
    );
    assert!(resolver.resolve("gone").await.unwrap().is_none());
    assert!(resolver.resolve("missing").await.unwrap().is_none());
    assert!(resolver.health_check().await);
}
