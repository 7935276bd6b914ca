//! Job handler contract.

use crate::error::WorkerResult;
use async_trait::async_trait;
use queue_backend::Job;

/// A job processor for one job type.
///
/// Return `Ok(())` for success, `Err` for failure. Failed jobs are retried
/// with the queue's backoff curve or dead-lettered when retries run out.
///
/// # Example
///
/// ```rust,ignore
/// struct EmailHandler {
///     provider: Arc<dyn EmailProvider>,
/// }
///
/// #[async_trait]
/// impl JobHandler for EmailHandler {
///     async fn handle(&self, job: &Job) -> WorkerResult<()> {
///         let email: Email = serde_json::from_value(job.payload.clone())
///             .map_err(|e| WorkerError::Handler(e.to_string()))?;
///         self.provider.send(email).await
///     }
///
///     fn job_type(&self) -> &str {
///         "send_email"
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process a single job.
    async fn handle(&self, job: &Job) -> WorkerResult<()>;

    /// The job type this handler is dispatched for.
    fn job_type(&self) -> &str;

    /// Health check for the handler's downstream dependencies.
    ///
    /// Default: always healthy.
    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn handle(&self, _job: &Job) -> WorkerResult<()> {
            Ok(())
        }

        fn job_type(&self) -> &str {
            "noop"
        }
    }

    #[tokio::test]
    async fn test_default_health_check() {
        let handler = NoopHandler;
        assert!(handler.health_check().await);
        assert!(handler.handle(&Job::new("q", "noop", json!({}))).await.is_ok());
    }
}
