//! Queue instrumentation helpers.
//!
//! Thin wrappers over the `metrics` macros so the queue crates record
//! consistent metric names and labels without depending on the exporter.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric names as constants for consistency
pub mod names {
    pub const JOBS_ENQUEUED: &str = "queue_jobs_enqueued_total";
    pub const JOBS_COMPLETED: &str = "queue_jobs_completed_total";
    pub const JOB_DURATION: &str = "queue_job_processing_duration_seconds";
    pub const DEPTH: &str = "queue_depth";
    pub const IN_FLIGHT: &str = "queue_in_flight_jobs";
    pub const DLQ_SIZE: &str = "queue_dlq_size";
    pub const RETRIES: &str = "queue_retries_total";
    pub const RATE_LIMITED: &str = "queue_rate_limited_total";
    pub const BREAKER_STATE: &str = "queue_circuit_breaker_state";
    pub const OUTBOX_RELAYED: &str = "outbox_rows_relayed_total";
    pub const OUTBOX_PENDING: &str = "outbox_pending_rows";
    pub const MIGRATION_PROGRESS: &str = "queue_migration_progress_percent";
}

/// Job outcome for metrics labeling
#[derive(Debug, Clone, Copy)]
pub enum JobOutcome {
    Acked,
    Retried,
    DeadLettered,
    Skipped,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acked => "acked",
            Self::Retried => "retried",
            Self::DeadLettered => "dead_lettered",
            Self::Skipped => "skipped",
        }
    }
}

/// Record a job accepted by a backend.
pub fn record_enqueued(queue: &str, priority: &str) {
    counter!(
        names::JOBS_ENQUEUED,
        "queue" => queue.to_string(),
        "priority" => priority.to_string()
    )
    .increment(1);
}

/// Record a job leaving the reserved state.
pub fn record_completed(queue: &str, outcome: JobOutcome) {
    counter!(
        names::JOBS_COMPLETED,
        "queue" => queue.to_string(),
        "outcome" => outcome.as_str().to_string()
    )
    .increment(1);
}

/// Record handler execution time.
pub fn record_duration(queue: &str, duration: Duration) {
    histogram!(names::JOB_DURATION, "queue" => queue.to_string()).record(duration.as_secs_f64());
}

/// Set the pending depth gauge for a queue.
pub fn set_depth(queue: &str, depth: f64) {
    gauge!(names::DEPTH, "queue" => queue.to_string()).set(depth);
}

/// Set the in-flight gauge for a queue.
pub fn set_in_flight(queue: &str, count: f64) {
    gauge!(names::IN_FLIGHT, "queue" => queue.to_string()).set(count);
}

/// Set the DLQ length gauge for a queue.
pub fn set_dlq_size(queue: &str, size: f64) {
    gauge!(names::DLQ_SIZE, "queue" => queue.to_string()).set(size);
}

/// Record a scheduled retry.
pub fn record_retry(queue: &str, attempt: u32) {
    counter!(
        names::RETRIES,
        "queue" => queue.to_string(),
        "attempt" => attempt.to_string()
    )
    .increment(1);
}

/// Record a reservation delayed by the token bucket.
pub fn record_rate_limited(queue: &str) {
    counter!(names::RATE_LIMITED, "queue" => queue.to_string()).increment(1);
}

/// Set the breaker-state gauge: 0 closed, 1 half-open, 2 open.
pub fn set_breaker_state(queue: &str, job_type: &str, state: u8) {
    gauge!(
        names::BREAKER_STATE,
        "queue" => queue.to_string(),
        "job_type" => job_type.to_string()
    )
    .set(state as f64);
}

/// Record an outbox row relayed (or failed).
pub fn record_outbox_relayed(outcome: &'static str) {
    counter!(names::OUTBOX_RELAYED, "outcome" => outcome).increment(1);
}

/// Set the pending-outbox gauge.
pub fn set_outbox_pending(count: f64) {
    gauge!(names::OUTBOX_PENDING).set(count);
}

/// Set migration progress for a queue.
pub fn set_migration_progress(queue: &str, percent: f64) {
    gauge!(names::MIGRATION_PROGRESS, "queue" => queue.to_string()).set(percent);
}

/// Timer guard that records a job duration when dropped.
pub struct DurationTimer {
    queue: String,
    start: std::time::Instant,
}

impl DurationTimer {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        record_duration(&self.queue, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(JobOutcome::Acked.as_str(), "acked");
        assert_eq!(JobOutcome::Retried.as_str(), "retried");
        assert_eq!(JobOutcome::DeadLettered.as_str(), "dead_lettered");
        assert_eq!(JobOutcome::Skipped.as_str(), "skipped");
    }

    #[test]
    fn test_recording_without_exporter_does_not_panic() {
        // The metrics macros no-op when no recorder is installed.
        record_enqueued("q1", "high");
        record_completed("q1", JobOutcome::Acked);
        record_duration("q1", Duration::from_millis(5));
        set_depth("q1", 3.0);
        record_retry("q1", 1);
        set_breaker_state("q1", "send_email", 2);
        drop(DurationTimer::new("q1"));
    }
}
