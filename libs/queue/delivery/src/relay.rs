//! Outbox relay.
//!
//! Moves committed outbox rows into the queue backend. The dedup reservation
//! is the single point of enqueue ordering, which makes the relay safe to run
//! in multiple instances; a `Duplicate` outcome means another instance (or an
//! earlier attempt) already enqueued the row, and counts as success.

use crate::dedup::{DedupOutcome, DedupStore};
use crate::error::DeliveryResult;
use crate::outbox::{OutboxRepository, OutboxRow};
use queue_backend::{Job, QueueBackend};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Sleep between polls when the outbox is drained
    pub poll_interval: Duration,
    /// Rows fetched per poll
    pub batch_size: u64,
    /// Rows past this many attempts wait for operator attention
    pub max_attempts: u32,
    /// TTL of the per-row dedup reservation
    pub dedup_ttl: Duration,
    /// Dedup namespace
    pub namespace: String,
    /// Cap for the error backoff between failed polls
    pub max_error_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_attempts: 10,
            dedup_ttl: Duration::from_secs(3600),
            namespace: "outbox".to_string(),
            max_error_backoff: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Background relay from the outbox table to a queue backend.
pub struct OutboxRelay<R: OutboxRepository> {
    repository: Arc<R>,
    dedup: Arc<dyn DedupStore>,
    backend: Arc<dyn QueueBackend>,
    config: RelayConfig,
    /// Guards shutdown so a double stop is a no-op
    stopped: AtomicBool,
}

impl<R: OutboxRepository> OutboxRelay<R> {
    pub fn new(
        repository: Arc<R>,
        dedup: Arc<dyn DedupStore>,
        backend: Arc<dyn QueueBackend>,
        config: RelayConfig,
    ) -> Self {
        Self {
            repository,
            dedup,
            backend,
            config,
            stopped: AtomicBool::new(false),
        }
    }

    /// Request shutdown. Idempotent: the first call wins, later calls are
    /// no-ops.
    pub fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Outbox relay stopping");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// One poll: fetch pending rows oldest-first and relay each.
    /// Returns how many rows were moved to `processed`.
    pub async fn relay_once(&self) -> DeliveryResult<usize> {
        let rows = self
            .repository
            .fetch_pending(self.config.batch_size, self.config.max_attempts)
            .await?;

        let mut processed = 0;
        for row in rows {
            match self.relay_row(&row).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    warn!(row_id = %row.id, error = %e, "Outbox row relay failed");
                    observability::queue::record_outbox_relayed("failed");
                    self.repository.record_failure(row.id, &e.to_string()).await?;
                }
            }
        }

        if let Ok(pending) = self.repository.pending_count().await {
            observability::queue::set_outbox_pending(pending as f64);
        }

        Ok(processed)
    }

    async fn relay_row(&self, row: &OutboxRow) -> DeliveryResult<()> {
        let job: Job = serde_json::from_value(row.payload.clone())?;

        // The job's own dedup key wins; the row id otherwise, so every
        // committed row is enqueued at most once even without one.
        let key = job
            .dedup_key
            .clone()
            .unwrap_or_else(|| row.id.to_string());

        let outcome = self
            .dedup
            .reserve(&self.config.namespace, &key, self.config.dedup_ttl)
            .await?;

        match outcome {
            DedupOutcome::New => {
                if let Err(e) = self.backend.enqueue(&job).await {
                    // Undo the reservation so a retry can enqueue
                    let _ = self.dedup.release(&self.config.namespace, &key).await;
                    return Err(e.into());
                }
                self.dedup
                    .confirm(&self.config.namespace, &key, self.config.dedup_ttl)
                    .await?;
                observability::queue::record_outbox_relayed("relayed");
                debug!(row_id = %row.id, queue = %row.queue, "Relayed outbox row");
            }
            DedupOutcome::Duplicate => {
                // Another instance got here first; success
                observability::queue::record_outbox_relayed("duplicate");
                debug!(row_id = %row.id, "Outbox row already enqueued");
            }
        }

        self.repository.mark_processed(row.id).await?;
        Ok(())
    }

    /// Poll until shutdown. Store errors back off with a doubling, capped
    /// delay and never terminate the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox relay started"
        );

        let mut error_backoff = self.config.poll_interval;

        loop {
            if self.is_stopped() || *shutdown.borrow() {
                break;
            }

            let sleep_for = match self.relay_once().await {
                Ok(processed) => {
                    if processed > 0 {
                        debug!(count = processed, "Outbox relay processed rows");
                    }
                    error_backoff = self.config.poll_interval;
                    self.config.poll_interval
                }
                Err(e) => {
                    error!(error = %e, "Outbox relay poll failed");
                    error_backoff = (error_backoff * 2).min(self.config.max_error_backoff);
                    error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        self.stop();
        info!("Outbox relay stopped");
    }
}
