//! Error types for the worker runtime.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum WorkerError {
    /// Handler-reported failure; counts against the job's retries.
    #[error("handler error: {0}")]
    Handler(String),

    /// Handler exceeded its processing deadline; counts against the job.
    #[error("handler timed out after {0:?}")]
    HandlerTimeout(std::time::Duration),

    /// No handler registered for a job type.
    #[error("no handler registered for job type '{0}'")]
    UnknownJobType(String),

    #[error("circuit breaker is open for ({queue}, {job_type})")]
    CircuitOpen { queue: String, job_type: String },

    #[error("rate limited on queue '{0}'")]
    RateLimited(String),

    #[error(transparent)]
    Backend(#[from] queue_backend::BackendError),
}

impl WorkerError {
    /// Stable machine-readable code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Handler(_) | Self::HandlerTimeout(_) => "JOB_PROCESSING",
            Self::UnknownJobType(_) => "INVALID_JOB_DATA",
            Self::CircuitOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Backend(e) => e.code(),
        }
    }

    /// Whether this failure should count against the job (handler errors do,
    /// infrastructure errors do not).
    pub fn counts_against_job(&self) -> bool {
        matches!(
            self,
            Self::Handler(_) | Self::HandlerTimeout(_) | Self::UnknownJobType(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            WorkerError::CircuitOpen {
                queue: "q".into(),
                job_type: "t".into(),
            }
            .code(),
            "CIRCUIT_BREAKER_OPEN"
        );
        assert_eq!(WorkerError::RateLimited("q".into()).code(), "RATE_LIMITED");
    }

    #[test]
    fn test_handler_errors_count_against_job() {
        assert!(WorkerError::Handler("boom".into()).counts_against_job());
        assert!(
            WorkerError::HandlerTimeout(std::time::Duration::from_secs(1)).counts_against_job()
        );
        assert!(!WorkerError::RateLimited("q".into()).counts_against_job());
        assert!(!WorkerError::Backend(queue_backend::BackendError::Timeout("x".into()))
            .counts_against_job());
    }
}
