//! The uniform queue storage contract.

use crate::capabilities::Capabilities;
use crate::config::QueueConfig;
use crate::error::BackendResult;
use crate::job::{Job, Reservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider variant, used for registry listings and migration validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    List,
    Stream,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Stream => "stream",
            Self::Memory => "memory",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Self::List),
            "stream" => Ok(Self::Stream),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend kind '{}'", other)),
        }
    }
}

/// Iteration direction for [`QueueBackend::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Bounds for [`QueueBackend::iter`].
///
/// The returned sequence is lazy, finite, and non-restartable.
#[derive(Debug, Clone, Default)]
pub struct IterOptions {
    pub order: IterOrder,
    /// Stop after this many jobs
    pub limit: Option<usize>,
    /// Only jobs created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only jobs created before this instant
    pub until: Option<DateTime<Utc>>,
}

impl IterOptions {
    pub fn oldest_first() -> Self {
        Self::default()
    }

    pub fn newest_first() -> Self {
        Self {
            order: IterOrder::NewestFirst,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_window(
        mut self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Whether a job's creation time falls inside the window.
    pub fn contains(&self, created_at: DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if created_at >= until {
                return false;
            }
        }
        true
    }
}

/// The queue storage contract implemented by every provider.
///
/// All methods respect a caller-supplied deadline where one applies; blocking
/// calls return within a bounded delay after cancellation of the caller.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Registry name of this backend instance (e.g. "primary").
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;

    /// Create or replace the configuration of a queue.
    async fn configure_queue(&self, config: QueueConfig) -> BackendResult<()>;

    /// Fetch the configuration of a queue.
    async fn queue_config(&self, queue: &str) -> BackendResult<QueueConfig>;

    /// Names of all configured queues.
    async fn queues(&self) -> BackendResult<Vec<String>>;

    /// Append a job to its queue. Returns a provider-specific entry id once
    /// the store has durably accepted the write (to the degree the provider
    /// guarantees).
    async fn enqueue(&self, job: &Job) -> BackendResult<String>;

    /// Append a batch of jobs in one round trip where `batch_ops` holds.
    ///
    /// Default implementation loops over [`enqueue`](Self::enqueue).
    async fn enqueue_batch(&self, jobs: &[Job]) -> BackendResult<Vec<String>> {
        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            ids.push(self.enqueue(job).await?);
        }
        Ok(ids)
    }

    /// Atomically move up to `count` pending jobs from the highest non-empty
    /// priority class of `queues` into the reserved state for `consumer_id`,
    /// blocking up to `timeout`. Returns an empty vec on timeout.
    async fn reserve(
        &self,
        queues: &[String],
        consumer_id: &str,
        timeout: Duration,
        count: usize,
    ) -> BackendResult<Vec<Reservation>>;

    /// Remove the reservation and delete the job (terminal success).
    async fn ack(&self, reservation: &Reservation) -> BackendResult<()>;

    /// Remove the reservation. With `requeue`, the job returns to the head of
    /// its priority class after the delay computed from the queue's backoff
    /// spec, with `retry_count` incremented. Without `requeue`, the job is
    /// left for DLQ handling (the caller follows with
    /// [`move_job`](Self::move_job)).
    async fn nack(&self, reservation: &Reservation, requeue: bool) -> BackendResult<()>;

    /// Return a reserved job to the head of its priority class with its
    /// retry counter unchanged. Used by operator-initiated drain, where the
    /// cancellation must not count against the job.
    async fn release_reservation(&self, reservation: &Reservation) -> BackendResult<()>;

    /// Push the visibility deadline of a live reservation (heartbeat).
    async fn extend_reservation(
        &self,
        reservation: &Reservation,
        deadline: DateTime<Utc>,
    ) -> BackendResult<()>;

    /// Return the job at `offset` (0 = next to deliver) without state change.
    async fn peek(&self, queue: &str, offset: usize) -> BackendResult<Option<Job>>;

    /// Number of pending jobs (delayed and reserved jobs excluded).
    async fn len(&self, queue: &str) -> BackendResult<usize>;

    /// Atomically transfer a reserved (or nacked-without-requeue) job to
    /// another queue. Used for dead-lettering and migration.
    async fn move_job(&self, reservation: &Reservation, target_queue: &str) -> BackendResult<()>;

    /// Lazily iterate pending jobs of a queue within the given bounds.
    ///
    /// The stream is finite and non-restartable; it observes a best-effort
    /// snapshot (jobs enqueued while iterating may or may not appear).
    async fn iter(
        &self,
        queue: &str,
        opts: IterOptions,
    ) -> BackendResult<BoxStream<'static, BackendResult<Job>>>;

    /// Re-deliver reservations past their visibility deadline and promote
    /// due delayed jobs. Returns how many jobs changed state.
    ///
    /// The reaper task calls this periodically; each reclaimed job has its
    /// `retry_count` incremented and returns to the head of its priority
    /// class.
    async fn reclaim_expired(&self, queue: &str) -> BackendResult<usize>;

    /// Verify the provider can reach its store.
    async fn health_check(&self) -> BackendResult<()>;
}
