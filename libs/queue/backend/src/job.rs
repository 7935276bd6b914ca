//! Job model and reservation handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Delivery priority of a job.
///
/// Within one queue, higher priorities are strictly preferred when non-empty;
/// jobs of equal priority are delivered FIFO by enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// All priorities in delivery order (highest first).
    pub const DESCENDING: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Scheduling weight used by the worker's weighted queue pick.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Critical => 8,
            Self::High => 4,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work.
///
/// Immutable once enqueued, except for `retry_count` (monotonically
/// non-decreasing) and reservation bookkeeping held outside the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Stable identity
    pub id: Uuid,
    /// Logical queue this job belongs to
    pub queue: String,
    /// Handler-dispatch type (e.g. "send_email")
    pub job_type: String,
    /// Opaque payload handed to the handler
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// Times this job has gone reserved -> pending
    pub retry_count: u32,
    /// Retries allowed before dead-lettering
    pub max_retries: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Carries trace context and operator annotations
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Caller-supplied duplicate-suppression key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
}

impl Job {
    /// Create a job with defaults: medium priority, 3 retries, no tags.
    pub fn new(
        queue: impl Into<String>,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue: queue.into(),
            job_type: job_type.into(),
            payload,
            priority: Priority::Medium,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries: 3,
            tags: Vec::new(),
            metadata: HashMap::new(),
            dedup_key: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Copy with an incremented retry count (reserved -> pending transition).
    pub fn with_retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }

    /// Whether another failure should dead-letter this job.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// A claim on a job by one consumer, bounded by a visibility deadline.
///
/// Created by `reserve`, destroyed by `ack`, `nack`, or deadline expiry
/// (reaper-driven re-delivery).
#[derive(Debug, Clone)]
pub struct Reservation {
    pub job: Job,
    pub consumer_id: String,
    /// Wall-clock time after which the reservation is reclaimable
    pub deadline: DateTime<Utc>,
    /// Provider-specific delivery handle (job id for lists, `stream|entry-id`
    /// for streams)
    pub handle: String,
}

impl Reservation {
    pub fn queue(&self) -> &str {
        &self.job.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Medium);
        assert!(Priority::Medium < Priority::Low);
        assert_eq!(
            Priority::DESCENDING,
            [
                Priority::Critical,
                Priority::High,
                Priority::Medium,
                Priority::Low
            ]
        );
    }

    #[test]
    fn test_priority_round_trip() {
        for p in Priority::DESCENDING {
            let parsed: Priority = p.as_str().parse().unwrap();
            assert_eq!(parsed, p);
        }
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_job_builder() {
        let job = Job::new("emails", "send_email", json!({"to": "a@example.com"}))
            .with_priority(Priority::High)
            .with_max_retries(5)
            .with_dedup_key("email-42")
            .with_metadata("trace_id", "abc123");

        assert_eq!(job.queue, "emails");
        assert_eq!(job.priority, Priority::High);
        assert_eq!(job.max_retries, 5);
        assert_eq!(job.dedup_key.as_deref(), Some("email-42"));
        assert_eq!(job.metadata["trace_id"], "abc123");
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn test_with_retry_is_monotone() {
        let job = Job::new("q", "t", json!(null));
        let retried = job.with_retry().with_retry();
        assert_eq!(retried.retry_count, 2);
        assert_eq!(retried.id, job.id);
    }

    #[test]
    fn test_retries_exhausted() {
        let mut job = Job::new("q", "t", json!(null)).with_max_retries(2);
        assert!(!job.retries_exhausted());
        job.retry_count = 2;
        assert!(job.retries_exhausted());
    }

    #[test]
    fn test_job_serde_round_trip() {
        let job = Job::new("q1", "resize", json!({"w": 64})).with_priority(Priority::Critical);
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.priority, Priority::Critical);
        assert_eq!(decoded.payload, json!({"w": 64}));
    }
}
