//! Background reclaim task.
//!
//! Periodically sweeps every configured queue of a backend, re-delivering
//! reservations past their visibility deadline and promoting due delayed
//! jobs. List backends need this to make progress; stream backends use it to
//! drive `XAUTOCLAIM` and delayed promotion on the same cadence.

use crate::backend::QueueBackend;
use crate::error::BackendResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Background reclaim task over one backend.
pub struct Reaper {
    backend: Arc<dyn QueueBackend>,
    interval: Duration,
}

impl Reaper {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            backend,
            interval: Duration::from_secs(5),
        }
    }

    /// Sweep cadence (default 5s).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One sweep over all configured queues. Returns total jobs re-delivered.
    pub async fn sweep(&self) -> BackendResult<usize> {
        let mut total = 0;
        for queue in self.backend.queues().await? {
            match self.backend.reclaim_expired(&queue).await {
                Ok(reclaimed) => total += reclaimed,
                Err(e) if e.is_retryable() => {
                    debug!(queue = %queue, error = %e, "Reclaim sweep skipped queue");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Run sweeps until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            backend = %self.backend.name(),
            interval_ms = self.interval.as_millis() as u64,
            "Reaper started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.sweep().await {
                Ok(reclaimed) if reclaimed > 0 => {
                    debug!(count = reclaimed, "Reaper re-delivered jobs");
                }
                Ok(_) => {}
                Err(e) => {
                    // Background reclaim retries forever on store errors
                    error!(error = %e, "Reaper sweep failed");
                }
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Reaper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::job::{Job, Priority};
    use crate::memory::MemoryBackend;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_reclaims_expired_reservation() {
        let backend = Arc::new(MemoryBackend::new("mem"));
        backend
            .configure_queue(
                QueueConfig::new("q1").with_visibility_timeout(Duration::from_millis(20)),
            )
            .await
            .unwrap();

        let job = Job::new("q1", "t", json!({})).with_priority(Priority::High);
        backend.enqueue(&job).await.unwrap();
        backend
            .reserve(&["q1".into()], "dead-consumer", Duration::from_millis(10), 1)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let reaper = Reaper::new(backend.clone());
        let reclaimed = reaper.sweep().await.unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(backend.len("q1").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let backend = Arc::new(MemoryBackend::new("mem"));
        let reaper = Reaper::new(backend).with_interval(Duration::from_millis(10));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { reaper.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper must stop after shutdown")
            .unwrap();
    }
}
