//! Integration tests for the Redis dedup store and the Postgres outbox.
//!
//! Each test boots a throwaway container; Docker must be available.

use delivery::{
    DedupOutcome, DedupStore, NewOutboxRow, OutboxRepository, OutboxStatus, PgOutboxRepository,
    RedisDedupStore,
};
use sea_orm::TransactionTrait;
use serde_json::json;
use std::time::Duration;
use test_utils::{TestDatabase, TestRedis};

#[tokio::test]
async fn test_redis_dedup_lifecycle() {
    let redis = TestRedis::new().await;
    let store = RedisDedupStore::new(redis.connection());
    let ttl = Duration::from_secs(60);

    // First reservation is new, the second duplicate
    assert_eq!(
        store.reserve("jobs", "k", ttl).await.unwrap(),
        DedupOutcome::New
    );
    assert_eq!(
        store.reserve("jobs", "k", ttl).await.unwrap(),
        DedupOutcome::Duplicate
    );

    // Release lets a legitimate retry proceed
    store.release("jobs", "k").await.unwrap();
    assert_eq!(
        store.reserve("jobs", "k", ttl).await.unwrap(),
        DedupOutcome::New
    );
}

#[tokio::test]
async fn test_redis_dedup_ttl_expiry() {
    let redis = TestRedis::new().await;
    let store = RedisDedupStore::new(redis.connection());

    assert_eq!(
        store
            .reserve("jobs", "short", Duration::from_millis(500))
            .await
            .unwrap(),
        DedupOutcome::New
    );

    tokio::time::sleep(Duration::from_millis(700)).await;

    // Past the TTL the key is free again
    assert_eq!(
        store
            .reserve("jobs", "short", Duration::from_secs(60))
            .await
            .unwrap(),
        DedupOutcome::New
    );
}

#[tokio::test]
async fn test_redis_dedup_confirm_extends() {
    let redis = TestRedis::new().await;
    let store = RedisDedupStore::new(redis.connection());

    store
        .reserve("jobs", "c", Duration::from_millis(500))
        .await
        .unwrap();
    store
        .confirm("jobs", "c", Duration::from_secs(60))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;

    // Still protected: confirm reset the TTL past the original window
    assert_eq!(
        store
            .reserve("jobs", "c", Duration::from_secs(60))
            .await
            .unwrap(),
        DedupOutcome::Duplicate
    );
}

#[tokio::test]
async fn test_pg_outbox_append_in_business_txn() {
    let db = TestDatabase::new().await;
    let repository = PgOutboxRepository::new(db.connection());

    // Committed transaction: the row is visible
    let txn = db.connection().begin().await.unwrap();
    let row = repository
        .append_in_txn(&txn, NewOutboxRow::new("emails", json!({"n": 1})))
        .await
        .unwrap();
    txn.commit().await.unwrap();

    let pending = repository.fetch_pending(10, 5).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, row.id);
    assert_eq!(pending[0].status, OutboxStatus::Pending);

    // Rolled-back transaction: no row, no job
    let txn = db.connection().begin().await.unwrap();
    repository
        .append_in_txn(&txn, NewOutboxRow::new("emails", json!({"n": 2})))
        .await
        .unwrap();
    txn.rollback().await.unwrap();

    assert_eq!(repository.fetch_pending(10, 5).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pg_outbox_failure_bookkeeping() {
    let db = TestDatabase::new().await;
    let repository = PgOutboxRepository::new(db.connection());

    let txn = db.connection().begin().await.unwrap();
    let row = repository
        .append_in_txn(&txn, NewOutboxRow::new("emails", json!({})))
        .await
        .unwrap();
    txn.commit().await.unwrap();

    repository
        .record_failure(row.id, "connection refused")
        .await
        .unwrap();
    repository
        .record_failure(row.id, "connection refused")
        .await
        .unwrap();

    let pending = repository.fetch_pending(10, 5).await.unwrap();
    assert_eq!(pending[0].attempts, 2);
    assert_eq!(
        pending[0].last_error.as_deref(),
        Some("connection refused")
    );

    // Attempt cap hides the row from the relay
    assert!(repository.fetch_pending(10, 2).await.unwrap().is_empty());

    repository.mark_processed(row.id).await.unwrap();
    assert_eq!(repository.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_pg_outbox_oldest_first_ordering() {
    let db = TestDatabase::new().await;
    let repository = PgOutboxRepository::new(db.connection());

    let mut ids = Vec::new();
    for n in 0..3 {
        let txn = db.connection().begin().await.unwrap();
        let row = repository
            .append_in_txn(&txn, NewOutboxRow::new("emails", json!({ "n": n })))
            .await
            .unwrap();
        txn.commit().await.unwrap();
        ids.push(row.id);
    }

    let pending = repository.fetch_pending(10, 5).await.unwrap();
    let fetched: Vec<_> = pending.iter().map(|row| row.id).collect();
    assert_eq!(fetched, ids);
}
