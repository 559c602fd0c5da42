//! Integration tests for PgSignalStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.
//!
//! Tests use fresh UUIDs per run and never assert global table counts, so
//! they tolerate leftover rows and parallel execution.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use leadsignal_common::{ExtractedSignal, SignalAction};
use leadsignal_scout::{PgSignalStore, SignalStore};

/// Get a migrated store, or skip if no test DB is available.
async fn test_store() -> Option<PgSignalStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = PgSignalStore::new(pool);
    store.migrate().await.ok()?;
    Some(store)
}

fn make_signal(target_id: Uuid, definition_id: &str, contribution: i32) -> ExtractedSignal {
    ExtractedSignal {
        id: Uuid::new_v4(),
        target_id,
        definition_id: definition_id.to_string(),
        label: "Actively hiring".to_string(),
        confidence: 75,
        evidence_snippet: "we're hiring 20 engineers".to_string(),
        score_contribution: contribution,
        action: SignalAction::IncreaseScore,
        source_scrape_id: Uuid::new_v4(),
        detected_at: Utc::now(),
    }
}

#[tokio::test]
async fn migrate_is_idempotent() {
    let Some(store) = test_store().await else {
        eprintln!("Skipping: DATABASE_TEST_URL not set");
        return;
    };
    store.migrate().await.unwrap();
}

#[tokio::test]
async fn upsert_inserts_then_updates_in_place() {
    let Some(store) = test_store().await else {
        eprintln!("Skipping: DATABASE_TEST_URL not set");
        return;
    };
    let target_id = Uuid::new_v4();

    store
        .upsert_batch(&[make_signal(target_id, "actively-hiring", 15)])
        .await
        .unwrap();

    let first = store.signals_for_target(target_id).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].score_contribution, 15);

    // Same (target, definition) identity with refreshed evidence.
    let mut updated = make_signal(target_id, "actively-hiring", 15);
    updated.confidence = 81;
    updated.evidence_snippet = "hiring across three offices".to_string();
    store.upsert_batch(&[updated]).await.unwrap();

    let second = store.signals_for_target(target_id).await.unwrap();
    assert_eq!(second.len(), 1, "re-detection updates, never duplicates");
    assert_eq!(second[0].confidence, 81);
    assert_eq!(second[0].evidence_snippet, "hiring across three offices");
    assert_eq!(second[0].id, first[0].id, "row identity survives the update");
}

#[tokio::test]
async fn batch_lands_together() {
    let Some(store) = test_store().await else {
        eprintln!("Skipping: DATABASE_TEST_URL not set");
        return;
    };
    let target_id = Uuid::new_v4();

    store
        .upsert_batch(&[
            make_signal(target_id, "actively-hiring", 15),
            make_signal(target_id, "funding-round", 25),
            make_signal(target_id, "expansion", 10),
        ])
        .await
        .unwrap();

    let signals = store.signals_for_target(target_id).await.unwrap();
    assert_eq!(signals.len(), 3);
    let total: i32 = signals.iter().map(|s| s.score_contribution).sum();
    assert_eq!(total, 50);
}

#[tokio::test]
async fn targets_are_isolated() {
    let Some(store) = test_store().await else {
        eprintln!("Skipping: DATABASE_TEST_URL not set");
        return;
    };
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    store
        .upsert_batch(&[make_signal(a, "actively-hiring", 15)])
        .await
        .unwrap();

    assert_eq!(store.signals_for_target(a).await.unwrap().len(), 1);
    assert!(store.signals_for_target(b).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let Some(store) = test_store().await else {
        eprintln!("Skipping: DATABASE_TEST_URL not set");
        return;
    };
    store.upsert_batch(&[]).await.unwrap();
}

#[tokio::test]
async fn action_survives_round_trip() {
    let Some(store) = test_store().await else {
        eprintln!("Skipping: DATABASE_TEST_URL not set");
        return;
    };
    let target_id = Uuid::new_v4();

    let mut flagged = make_signal(target_id, "leadership-change", 0);
    flagged.action = SignalAction::FlagForReview;
    store.upsert_batch(&[flagged]).await.unwrap();

    let signals = store.signals_for_target(target_id).await.unwrap();
    assert_eq!(signals[0].action, SignalAction::FlagForReview);
}
