//! Outbox domain model and repository contract.

use crate::error::{DeliveryError, DeliveryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseTransaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Row status; `processed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Processed,
}

/// An outbox row as the relay sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRow {
    pub id: Uuid,
    /// Target queue of the pending enqueue
    pub queue: String,
    /// Serialized job
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub status: OutboxStatus,
    /// Relay attempts so far
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Input for appending a row inside a business transaction.
#[derive(Debug, Clone)]
pub struct NewOutboxRow {
    pub queue: String,
    pub payload: serde_json::Value,
}

impl NewOutboxRow {
    pub fn new(queue: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            queue: queue.into(),
            payload,
        }
    }
}

/// Persistence contract for outbox rows.
///
/// `append_in_txn` is the only write producers perform; everything else
/// belongs to the relay. A business write is visible iff its outbox row
/// exists - both commit or neither does.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a pending row inside the caller's open transaction.
    async fn append_in_txn(
        &self,
        txn: &DatabaseTransaction,
        row: NewOutboxRow,
    ) -> DeliveryResult<OutboxRow>;

    /// Pending rows with `attempts < max_attempts`, oldest first.
    async fn fetch_pending(&self, limit: u64, max_attempts: u32) -> DeliveryResult<Vec<OutboxRow>>;

    /// Move a row to `processed` (terminal). Idempotent.
    async fn mark_processed(&self, id: Uuid) -> DeliveryResult<()>;

    /// Record a failed relay attempt: bump `attempts`, set `last_error`,
    /// leave status `pending`.
    async fn record_failure(&self, id: Uuid, error: &str) -> DeliveryResult<()>;

    /// Count of rows still pending (for the backlog gauge).
    async fn pending_count(&self) -> DeliveryResult<u64>;
}

/// In-process repository for tests and local development.
///
/// `append` replaces `append_in_txn` since there is no database transaction
/// to join.
#[derive(Default)]
pub struct MemoryOutboxRepository {
    rows: Mutex<BTreeMap<Uuid, OutboxRow>>,
}

impl MemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending row (test-side producer path).
    pub fn append(&self, row: NewOutboxRow) -> OutboxRow {
        let stored = OutboxRow {
            id: Uuid::new_v4(),
            queue: row.queue,
            payload: row.payload,
            created_at: Utc::now(),
            processed_at: None,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
        };
        self.rows
            .lock()
            .unwrap()
            .insert(stored.id, stored.clone());
        stored
    }

    pub fn get(&self, id: Uuid) -> Option<OutboxRow> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl OutboxRepository for MemoryOutboxRepository {
    async fn append_in_txn(
        &self,
        _txn: &DatabaseTransaction,
        row: NewOutboxRow,
    ) -> DeliveryResult<OutboxRow> {
        Ok(self.append(row))
    }

    async fn fetch_pending(&self, limit: u64, max_attempts: u32) -> DeliveryResult<Vec<OutboxRow>> {
        let rows = self.rows.lock().unwrap();
        let mut pending: Vec<OutboxRow> = rows
            .values()
            .filter(|row| row.status == OutboxStatus::Pending && row.attempts < max_attempts)
            .cloned()
            .collect();
        pending.sort_by_key(|row| row.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_processed(&self, id: Uuid) -> DeliveryResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(DeliveryError::RowNotFound(id))?;
        row.status = OutboxStatus::Processed;
        row.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, error: &str) -> DeliveryResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).ok_or(DeliveryError::RowNotFound(id))?;
        row.attempts += 1;
        row.last_error = Some(error.to_string());
        Ok(())
    }

    async fn pending_count(&self) -> DeliveryResult<u64> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|row| row.status == OutboxStatus::Pending)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_pending_is_oldest_first() {
        let repo = MemoryOutboxRepository::new();
        let first = repo.append(NewOutboxRow::new("q", json!({"n": 1})));
        let second = repo.append(NewOutboxRow::new("q", json!({"n": 2})));

        let pending = repo.fetch_pending(10, 5).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);
    }

    #[tokio::test]
    async fn test_mark_processed_is_terminal() {
        let repo = MemoryOutboxRepository::new();
        let row = repo.append(NewOutboxRow::new("q", json!({})));

        repo.mark_processed(row.id).await.unwrap();
        assert!(repo.fetch_pending(10, 5).await.unwrap().is_empty());

        let stored = repo.get(row.id).unwrap();
        assert_eq!(stored.status, OutboxStatus::Processed);
        assert!(stored.processed_at.is_some());

        // Idempotent
        repo.mark_processed(row.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_failure_keeps_row_pending() {
        let repo = MemoryOutboxRepository::new();
        let row = repo.append(NewOutboxRow::new("q", json!({})));

        repo.record_failure(row.id, "backend down").await.unwrap();

        let stored = repo.get(row.id).unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("backend down"));
    }

    #[tokio::test]
    async fn test_fetch_pending_respects_max_attempts() {
        let repo = MemoryOutboxRepository::new();
        let row = repo.append(NewOutboxRow::new("q", json!({})));
        for _ in 0..3 {
            repo.record_failure(row.id, "boom").await.unwrap();
        }

        assert!(repo.fetch_pending(10, 3).await.unwrap().is_empty());
        assert_eq!(repo.fetch_pending(10, 4).await.unwrap().len(), 1);
    }
}
