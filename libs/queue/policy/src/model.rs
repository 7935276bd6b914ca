//! Versioned policy records.

use crate::error::{PolicyError, PolicyResult};
use queue_backend::{DlqSpec, RateLimitSpec};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

/// Shape of the retry delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    Constant,
}

/// Retry behavior of a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RetrySpec {
    pub max_retries: u32,
    /// Milliseconds before the first retry; must be > 0
    pub initial_backoff_ms: u64,
    /// Cap on the delay; must be >= initial
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub strategy: BackoffStrategy,
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
            multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetrySpec {
    /// Delay before the next attempt after `retry_count` failures.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let initial = self.initial_backoff_ms as f64;
        let millis = match self.strategy {
            BackoffStrategy::Exponential => initial * self.multiplier.powi(retry_count.min(24) as i32),
            BackoffStrategy::Linear => initial * (retry_count as f64 + 1.0),
            BackoffStrategy::Constant => initial,
        };
        Duration::from_millis((millis as u64).min(self.max_backoff_ms))
    }
}

/// A versioned, immutable policy bundle for one queue.
///
/// Only one version is current per queue; prior versions stay in the store
/// for rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Policy {
    pub queue: String,
    /// Assigned by the store on publish; 0 until then
    #[serde(default)]
    pub version: u64,
    pub retry: RetrySpec,
    #[schema(value_type = Object)]
    pub rate: RateLimitSpec,
    /// Executor permits; must be >= 1
    pub max_concurrency: u32,
    /// Capacity K of the queue in the M/M/c model
    pub queue_size: u64,
    /// Milliseconds a handler may run; service rate is its inverse
    pub processing_timeout_ms: u64,
    #[schema(value_type = Object)]
    pub dlq: DlqSpec,
}

impl Policy {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            version: 0,
            retry: RetrySpec::default(),
            rate: RateLimitSpec::default(),
            max_concurrency: 4,
            queue_size: 10_000,
            processing_timeout_ms: 30_000,
            dlq: DlqSpec::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetrySpec) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate(mut self, rate_per_second: f64, burst: u32) -> Self {
        self.rate = RateLimitSpec {
            enabled: true,
            rate_per_second,
            burst,
        };
        self
    }

    pub fn with_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_queue_size(mut self, queue_size: u64) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Service rate μ in jobs per second (1 / processing timeout).
    pub fn service_rate(&self) -> f64 {
        1000.0 / self.processing_timeout_ms as f64
    }

    /// Check the policy invariants.
    pub fn validate(&self) -> PolicyResult<()> {
        if self.queue.is_empty() {
            return Err(PolicyError::InvalidConfiguration(
                "policy queue must not be empty".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms == 0 {
            return Err(PolicyError::InvalidConfiguration(
                "initial backoff must be > 0".to_string(),
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(PolicyError::InvalidConfiguration(
                "max backoff must be >= initial backoff".to_string(),
            ));
        }
        if self.rate.enabled && self.rate.rate_per_second <= 0.0 {
            return Err(PolicyError::InvalidConfiguration(
                "rate_per_second must be > 0".to_string(),
            ));
        }
        if self.max_concurrency < 1 {
            return Err(PolicyError::InvalidConfiguration(
                "max_concurrency must be >= 1".to_string(),
            ));
        }
        if self.processing_timeout_ms == 0 {
            return Err(PolicyError::InvalidConfiguration(
                "processing timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        assert!(Policy::new("q").validate().is_ok());
    }

    #[test]
    fn test_validation_rules() {
        let mut policy = Policy::new("q");
        policy.retry.initial_backoff_ms = 0;
        assert!(policy.validate().is_err());

        let mut policy = Policy::new("q");
        policy.retry.max_backoff_ms = 100;
        policy.retry.initial_backoff_ms = 200;
        assert!(policy.validate().is_err());

        let policy = Policy::new("q").with_rate(0.0, 1);
        assert!(policy.validate().is_err());

        let mut policy = Policy::new("q");
        policy.max_concurrency = 0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_retry_delay_strategies() {
        let exponential = RetrySpec {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
        };
        assert_eq!(exponential.delay_for(0), Duration::from_millis(100));
        assert_eq!(exponential.delay_for(2), Duration::from_millis(400));
        assert_eq!(exponential.delay_for(10), Duration::from_secs(1));

        let linear = RetrySpec {
            strategy: BackoffStrategy::Linear,
            ..exponential.clone()
        };
        assert_eq!(linear.delay_for(0), Duration::from_millis(100));
        assert_eq!(linear.delay_for(2), Duration::from_millis(300));

        let constant = RetrySpec {
            strategy: BackoffStrategy::Constant,
            ..exponential
        };
        assert_eq!(constant.delay_for(0), Duration::from_millis(100));
        assert_eq!(constant.delay_for(9), Duration::from_millis(100));
    }

    #[test]
    fn test_service_rate() {
        let policy = Policy::new("q").with_processing_timeout(Duration::from_millis(250));
        assert!((policy.service_rate() - 4.0).abs() < f64::EPSILON);
    }
}
