//! Worker runtime configuration.

use crate::selector::QueueSelector;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for one worker runtime instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique consumer id (auto-generated if not provided)
    pub consumer_id: String,

    /// Which queues this worker consumes
    pub selector: QueueSelector,

    /// Concurrency budget (executor permits)
    pub max_concurrency: usize,

    /// Blocking window of each reserve call
    pub block_timeout: Duration,

    /// Upper bound on handler execution; the effective deadline is
    /// min(visibility deadline, this)
    pub processing_timeout: Duration,

    /// Heartbeat period; None derives visibility/3 per queue
    pub heartbeat_interval: Option<Duration>,

    /// How long drain waits for in-flight jobs before cancelling them
    pub drain_grace: Duration,

    /// Hard drain bound; past this, outstanding reservations are abandoned
    /// to reaper-driven re-delivery
    pub drain_timeout: Duration,

    /// Base backoff after a failed reserve (jittered, doubling)
    pub reserve_backoff: Duration,

    /// Cap for the reserve backoff
    pub max_reserve_backoff: Duration,
}

impl WorkerConfig {
    pub fn new(selector: QueueSelector) -> Self {
        Self {
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            selector,
            max_concurrency: 4,
            block_timeout: Duration::from_secs(1),
            processing_timeout: Duration::from_secs(30),
            heartbeat_interval: None,
            drain_grace: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            reserve_backoff: Duration::from_millis(200),
            max_reserve_backoff: Duration::from_secs(10),
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_max_concurrency(mut self, permits: usize) -> Self {
        self.max_concurrency = permits.max(1);
        self
    }

    pub fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn with_drain(mut self, grace: Duration, timeout: Duration) -> Self {
        self.drain_grace = grace;
        self.drain_timeout = timeout;
        self
    }

    /// Heartbeat period for a queue: the configured interval, capped at a
    /// third of the visibility timeout so three missed beats make the
    /// reservation reclaimable.
    pub fn heartbeat_for(&self, visibility: Duration) -> Duration {
        let derived = visibility / 3;
        match self.heartbeat_interval {
            Some(configured) => configured.min(derived),
            None => derived,
        }
    }
}
