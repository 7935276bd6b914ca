//! Per-queue configuration and validation.

use crate::error::{BackendError, BackendResult};
use crate::job::Priority;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token-bucket admission settings for a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    pub enabled: bool,
    /// Refill rate; must be > 0 when enabled
    pub rate_per_second: f64,
    /// Bucket capacity; must be >= 1
    pub burst: u32,
}

impl Default for RateLimitSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            rate_per_second: 100.0,
            burst: 10,
        }
    }
}

/// Retry backoff curve: delay = min(max, initial * multiplier^retry_count).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffSpec {
    #[serde(with = "duration_millis")]
    pub initial: Duration,
    #[serde(with = "duration_millis")]
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffSpec {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl BackoffSpec {
    /// Delay before the next attempt after `retry_count` previous failures.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = self.multiplier.powi(retry_count.min(24) as i32);
        let millis = (self.initial.as_millis() as f64 * factor) as u128;
        Duration::from_millis(millis.min(self.max.as_millis()) as u64)
    }
}

/// Dead-letter settings for a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqSpec {
    pub enabled: bool,
    /// Retries allowed before dead-lettering
    pub max_retries: u32,
    pub backoff: BackoffSpec,
}

impl Default for DlqSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: BackoffSpec::default(),
        }
    }
}

/// Retention settings applied by the provider where supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionSpec {
    /// Approximate cap on stored entries (stream MAXLEN ~); None = unbounded
    pub max_entries: Option<u64>,
}

impl Default for RetentionSpec {
    fn default() -> Self {
        Self {
            max_entries: Some(100_000),
        }
    }
}

/// Configuration of one logical queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    /// Default priority assigned to jobs enqueued without one
    pub default_priority: Priority,
    pub rate_limit: RateLimitSpec,
    pub dlq: DlqSpec,
    pub retention: RetentionSpec,
    /// How long a reservation stays visible before the reaper may reclaim it
    #[serde(with = "duration_millis")]
    pub visibility_timeout: Duration,
    /// Operator labels matched by worker selectors
    #[serde(default)]
    pub labels: Vec<String>,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_priority: Priority::Medium,
            rate_limit: RateLimitSpec::default(),
            dlq: DlqSpec::default(),
            retention: RetentionSpec::default(),
            visibility_timeout: Duration::from_secs(30),
            labels: Vec::new(),
        }
    }

    pub fn with_rate_limit(mut self, rate_per_second: f64, burst: u32) -> Self {
        self.rate_limit = RateLimitSpec {
            enabled: true,
            rate_per_second,
            burst,
        };
        self
    }

    pub fn with_dlq(mut self, dlq: DlqSpec) -> Self {
        self.dlq = dlq;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.dlq.backoff = BackoffSpec {
            initial,
            max,
            multiplier,
        };
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.dlq.max_retries = max_retries;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> BackendResult<()> {
        if self.name.is_empty() {
            return Err(BackendError::InvalidConfiguration(
                "queue name must not be empty".to_string(),
            ));
        }
        if self.rate_limit.enabled {
            if self.rate_limit.rate_per_second <= 0.0 {
                return Err(BackendError::InvalidConfiguration(format!(
                    "queue '{}': rate_per_second must be > 0 when rate limiting is enabled",
                    self.name
                )));
            }
            if self.rate_limit.burst < 1 {
                return Err(BackendError::InvalidConfiguration(format!(
                    "queue '{}': burst must be >= 1",
                    self.name
                )));
            }
        }
        if self.dlq.backoff.initial > self.dlq.backoff.max {
            return Err(BackendError::InvalidConfiguration(format!(
                "queue '{}': initial backoff exceeds max backoff",
                self.name
            )));
        }
        if self.dlq.backoff.multiplier < 1.0 {
            return Err(BackendError::InvalidConfiguration(format!(
                "queue '{}': backoff multiplier must be >= 1.0",
                self.name
            )));
        }
        if self.visibility_timeout.is_zero() {
            return Err(BackendError::InvalidConfiguration(format!(
                "queue '{}': visibility timeout must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Serialize `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
