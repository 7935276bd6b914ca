//! Built-in handlers.
//!
//! Deployments register their own `JobHandler` implementations through
//! [`run_with_handlers`](crate::run_with_handlers); the echo handler ships
//! as the default wiring so a fresh install processes `echo` jobs end to
//! end.

use async_trait::async_trait;
use queue_backend::Job;
use queue_worker::{JobHandler, WorkerResult};
use tracing::info;

/// Logs the job payload and succeeds.
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn handle(&self, job: &Job) -> WorkerResult<()> {
        info!(job_id = %job.id, queue = %job.queue, payload = %job.payload, "echo");
        Ok(())
    }

    fn job_type(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_succeeds() {
        let handler = EchoHandler;
        let job = Job::new("q", "echo", json!({"hello": "world"}));
        assert!(handler.handle(&job).await.is_ok());
        assert_eq!(handler.job_type(), "echo");
    }
}
