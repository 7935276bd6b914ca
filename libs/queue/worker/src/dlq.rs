//! Dead-letter queue administration.
//!
//! A DLQ is an ordinary queue named `{queue}:dlq`, so management is built
//! entirely on the backend contract: listing uses `iter`, requeue re-enqueues
//! to the source queue with the retry counter reset, purge acks entries away.

use crate::error::WorkerResult;
use futures::StreamExt;
use queue_backend::{dlq_name, IterOptions, Job, QueueBackend};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Reserve window used for administrative draining of DLQ entries.
const ADMIN_RESERVE_TIMEOUT: Duration = Duration::from_millis(200);

/// Summary of one queue's dead letters.
#[derive(Debug, Clone, Serialize)]
pub struct DlqStats {
    pub queue: String,
    pub length: usize,
    /// Enqueue time of the oldest dead letter, if any
    pub oldest_created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Administrative operations over dead-letter queues.
pub struct DlqManager {
    backend: Arc<dyn QueueBackend>,
    admin_id: String,
}

impl DlqManager {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            backend,
            admin_id: format!("dlq-admin-{}", Uuid::new_v4()),
        }
    }

    /// List up to `limit` dead letters of a queue, oldest first.
    pub async fn list(&self, queue: &str, limit: usize) -> WorkerResult<Vec<Job>> {
        let stream = self
            .backend
            .iter(&dlq_name(queue), IterOptions::oldest_first().with_limit(limit))
            .await?;
        let jobs: Vec<Job> = stream
            .filter_map(|item| async move { item.ok() })
            .collect()
            .await;
        Ok(jobs)
    }

    /// Length and oldest-entry age of a queue's DLQ.
    pub async fn stats(&self, queue: &str) -> WorkerResult<DlqStats> {
        let dlq = dlq_name(queue);
        let length = self.backend.len(&dlq).await?;
        let oldest_created_at = self.backend.peek(&dlq, 0).await?.map(|job| job.created_at);

        observability::queue::set_dlq_size(queue, length as f64);
        Ok(DlqStats {
            queue: queue.to_string(),
            length,
            oldest_created_at,
        })
    }

    /// Requeue up to `limit` dead letters back onto their source queue with
    /// the retry counter reset. Returns how many were requeued.
    pub async fn requeue(&self, queue: &str, limit: usize) -> WorkerResult<usize> {
        let dlq = dlq_name(queue);
        let mut requeued = 0;

        while requeued < limit {
            let batch = self
                .backend
                .reserve(
                    &[dlq.clone()],
                    &self.admin_id,
                    ADMIN_RESERVE_TIMEOUT,
                    (limit - requeued).min(100),
                )
                .await?;
            if batch.is_empty() {
                break;
            }

            for reservation in batch {
                let mut job = reservation.job.clone();
                job.queue = queue.to_string();
                job.retry_count = 0;

                self.backend.enqueue(&job).await?;
                self.backend.ack(&reservation).await?;
                requeued += 1;
            }
        }

        if requeued > 0 {
            info!(queue = %queue, count = requeued, "Requeued dead letters");
        }
        Ok(requeued)
    }

    /// Requeue a single dead letter by job id. Returns false when the id is
    /// not in the DLQ.
    pub async fn requeue_job(&self, queue: &str, job_id: Uuid) -> WorkerResult<bool> {
        let dlq = dlq_name(queue);

        // One sweep over the whole DLQ; released entries return to the head,
        // so a second reserve would hand the same batch back.
        let depth = self.backend.len(&dlq).await?;
        let batch = self
            .backend
            .reserve(&[dlq.clone()], &self.admin_id, ADMIN_RESERVE_TIMEOUT, depth)
            .await?;

        let mut found = false;
        for reservation in batch {
            if reservation.job.id == job_id {
                let mut job = reservation.job.clone();
                job.queue = queue.to_string();
                job.retry_count = 0;
                self.backend.enqueue(&job).await?;
                self.backend.ack(&reservation).await?;
                found = true;
            } else {
                // Untouched entries go back with their counter unchanged
                self.backend.release_reservation(&reservation).await?;
            }
        }

        if found {
            info!(queue = %queue, job_id = %job_id, "Requeued dead letter");
        }
        Ok(found)
    }

    /// Delete every dead letter of a queue. Returns how many were purged.
    pub async fn purge(&self, queue: &str) -> WorkerResult<usize> {
        let dlq = dlq_name(queue);
        let mut purged = 0;

        loop {
            let batch = self
                .backend
                .reserve(&[dlq.clone()], &self.admin_id, ADMIN_RESERVE_TIMEOUT, 100)
                .await?;
            if batch.is_empty() {
                break;
            }
            for reservation in batch {
                self.backend.ack(&reservation).await?;
                purged += 1;
            }
        }

        if purged > 0 {
            info!(queue = %queue, count = purged, "Purged dead letters");
        }
        observability::queue::set_dlq_size(queue, 0.0);
        Ok(purged)
    }
}
