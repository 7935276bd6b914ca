//! The reservation loop and executor.

use crate::breaker::{BreakerRegistry, CircuitBreakerConfig};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::handler::JobHandler;
use crate::limiter::RateLimiterSet;
use crate::retry::backoff_for_attempt;
use chrono::Utc;
use observability::queue::JobOutcome;
use queue_backend::{dlq_name, BackendError, QueueBackend, QueueConfig, Reservation};
use rand::RngExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Bounded-concurrency job executor over one backend.
///
/// Reservation loop, heartbeats, and executor tasks are independent
/// activities; none blocks on another's slow path. See the crate docs for
/// the overall flow.
pub struct WorkerRuntime {
    backend: Arc<dyn QueueBackend>,
    config: WorkerConfig,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    limiters: Arc<RateLimiterSet>,
    breakers: Arc<BreakerRegistry>,
}

impl WorkerRuntime {
    pub fn new(backend: Arc<dyn QueueBackend>, config: WorkerConfig) -> Self {
        Self {
            backend,
            config,
            handlers: HashMap::new(),
            limiters: Arc::new(RateLimiterSet::new()),
            breakers: Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default())),
        }
    }

    /// Override the circuit breaker defaults for every (queue, job type).
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breakers = Arc::new(BreakerRegistry::new(config));
        self
    }

    /// Register a handler; jobs are dispatched by `job_type`.
    pub fn register_handler(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.job_type().to_string(), handler);
    }

    pub fn breakers(&self) -> Arc<BreakerRegistry> {
        self.breakers.clone()
    }

    /// Queues this worker may reserve from right now, with their configs.
    /// Breaker-open queues are excluded.
    async fn eligible_queues(&self) -> WorkerResult<Vec<(String, QueueConfig)>> {
        let known = self.backend.queues().await?;
        let mut configs = Vec::with_capacity(known.len());
        for name in &known {
            match self.backend.queue_config(name).await {
                Ok(config) => configs.push(config),
                Err(BackendError::QueueNotFound(_)) => configs.push(QueueConfig::new(name)),
                Err(e) => return Err(e.into()),
            }
        }

        let selected = self.config.selector.resolve(&configs);
        let mut eligible = Vec::new();
        for name in selected {
            // DLQs are consumed through the admin surface, not the runtime
            if name.ends_with(queue_backend::DLQ_SUFFIX) {
                continue;
            }
            if !self.breakers.queue_allowed(&name) {
                continue;
            }
            let config = configs
                .iter()
                .find(|c| c.name == name)
                .cloned()
                .unwrap_or_else(|| QueueConfig::new(&name));
            eligible.push((name, config));
        }
        Ok(eligible)
    }

    /// Weighted-random pick among non-empty eligible queues; falls back to
    /// the full eligible set when everything looks empty (a blocking reserve
    /// then catches new arrivals).
    async fn pick_queue(
        &self,
        eligible: &[(String, QueueConfig)],
    ) -> Option<(String, QueueConfig)> {
        let mut non_empty = Vec::new();
        for (name, config) in eligible {
            match self.backend.len(name).await {
                Ok(0) | Err(_) => {}
                Ok(_) => non_empty.push((name.clone(), config.clone())),
            }
        }

        let pool: &[(String, QueueConfig)] = if non_empty.is_empty() {
            eligible
        } else {
            &non_empty
        };
        if pool.is_empty() {
            return None;
        }

        let total: u32 = pool
            .iter()
            .map(|(_, config)| config.default_priority.weight())
            .sum();
        let mut roll = rand::rng().random_range(0..total.max(1));
        for (name, config) in pool {
            let weight = config.default_priority.weight();
            if roll < weight {
                return Some((name.clone(), config.clone()));
            }
            roll -= weight;
        }
        pool.last().cloned()
    }

    /// Run the reservation loop until the shutdown signal flips, then drain.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            consumer_id = %self.config.consumer_id,
            max_concurrency = self.config.max_concurrency,
            "Worker runtime started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let (drain_tx, drain_rx) = watch::channel(false);
        let mut reserve_failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Detach finished executor tasks
            while in_flight.try_join_next().is_some() {}

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => {
                    permit.expect("semaphore never closed")
                }
                _ = shutdown.changed() => continue,
            };

            let eligible = match self.eligible_queues().await {
                Ok(eligible) => eligible,
                Err(e) => {
                    warn!(error = %e, "Failed to list queues");
                    drop(permit);
                    self.sleep_reserve_backoff(&mut reserve_failures, &mut shutdown).await;
                    continue;
                }
            };

            let Some((queue, config)) = self.pick_queue(&eligible).await else {
                drop(permit);
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(self.config.block_timeout) => {}
                }
                continue;
            };

            // Token bucket gates the dequeue; shutdown cancels the wait
            if let Some(bucket) = self.limiters.bucket(&queue, &config.rate_limit) {
                if !bucket.try_acquire(1) {
                    observability::queue::record_rate_limited(&queue);
                    tokio::select! {
                        _ = bucket.acquire(1) => {}
                        _ = shutdown.changed() => {
                            drop(permit);
                            continue;
                        }
                    }
                }
            }

            let reservations = match self
                .backend
                .reserve(
                    &[queue.clone()],
                    &self.config.consumer_id,
                    self.config.block_timeout,
                    1,
                )
                .await
            {
                Ok(reservations) => {
                    reserve_failures = 0;
                    reservations
                }
                Err(e) if e.is_retryable() => {
                    drop(permit);
                    debug!(queue = %queue, error = %e, "Reserve failed, backing off");
                    self.sleep_reserve_backoff(&mut reserve_failures, &mut shutdown).await;
                    continue;
                }
                Err(e) => {
                    drop(permit);
                    error!(queue = %queue, error = %e, "Reserve failed");
                    self.sleep_reserve_backoff(&mut reserve_failures, &mut shutdown).await;
                    continue;
                }
            };

            let Some(reservation) = reservations.into_iter().next() else {
                drop(permit);
                continue;
            };

            // Dispatch; the permit rides along and frees on completion
            let backend = self.backend.clone();
            let handler = self.handlers.get(&reservation.job.job_type).cloned();
            let breakers = self.breakers.clone();
            let heartbeat = self.config.heartbeat_for(config.visibility_timeout);
            let visibility = config.visibility_timeout;
            let max_retries = config.dlq.max_retries;
            let processing_timeout = self.config.processing_timeout;
            let drain = drain_rx.clone();

            in_flight.spawn(async move {
                let _permit = permit;
                execute(
                    backend,
                    handler,
                    breakers,
                    reservation,
                    ExecutionLimits {
                        visibility,
                        heartbeat,
                        processing_timeout,
                        max_retries,
                    },
                    drain,
                )
                .await;
            });
        }

        self.drain(in_flight, drain_tx).await;
        info!("Worker runtime stopped");
        Ok(())
    }

    async fn sleep_reserve_backoff(
        &self,
        failures: &mut u32,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let delay = backoff_for_attempt(
            *failures,
            self.config.reserve_backoff,
            self.config.max_reserve_backoff,
        );
        *failures = failures.saturating_add(1);
        tokio::select! {
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// Stop reserving, give in-flight jobs `drain_grace` to finish with
    /// heartbeats running, cancel the rest (retry counter unchanged), and
    /// abandon whatever is left once `drain_timeout` passes.
    async fn drain(&self, mut in_flight: JoinSet<()>, drain_tx: watch::Sender<bool>) {
        if in_flight.is_empty() {
            return;
        }

        info!(
            in_flight = in_flight.len(),
            grace_ms = self.config.drain_grace.as_millis() as u64,
            "Draining worker"
        );

        let grace_deadline = tokio::time::Instant::now() + self.config.drain_grace;
        while !in_flight.is_empty() {
            match tokio::time::timeout_at(grace_deadline, in_flight.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if in_flight.is_empty() {
            return;
        }

        // Grace expired: cancel the stragglers cooperatively
        warn!(in_flight = in_flight.len(), "Drain grace expired, cancelling in-flight jobs");
        let _ = drain_tx.send(true);

        let hard_deadline = tokio::time::Instant::now()
            + self.config.drain_timeout.saturating_sub(self.config.drain_grace);
        while !in_flight.is_empty() {
            match tokio::time::timeout_at(hard_deadline, in_flight.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if !in_flight.is_empty() {
            // Reaper-driven re-delivery picks these up after visibility expiry
            warn!(
                abandoned = in_flight.len(),
                "Drain timeout exceeded, abandoning reservations to the reaper"
            );
            in_flight.abort_all();
        }
    }
}

struct ExecutionLimits {
    visibility: Duration,
    heartbeat: Duration,
    processing_timeout: Duration,
    max_retries: u32,
}

/// Run one reserved job to completion: heartbeat while in flight, then ack,
/// retry with backoff, or dead-letter.
async fn execute(
    backend: Arc<dyn QueueBackend>,
    handler: Option<Arc<dyn JobHandler>>,
    breakers: Arc<BreakerRegistry>,
    reservation: Reservation,
    limits: ExecutionLimits,
    mut drain: watch::Receiver<bool>,
) {
    let queue = reservation.queue().to_string();
    let job_type = reservation.job.job_type.clone();
    let start = std::time::Instant::now();

    let heartbeat_handle = tokio::spawn(heartbeat_loop(
        backend.clone(),
        reservation.clone(),
        limits.heartbeat,
        limits.visibility,
    ));

    // Deadline = min(visibility deadline, processing timeout)
    let remaining_visibility = (reservation.deadline - Utc::now())
        .to_std()
        .unwrap_or(limits.visibility);
    let effective_timeout = remaining_visibility.min(limits.processing_timeout);

    let outcome = tokio::select! {
        result = run_handler(handler, &reservation, effective_timeout) => Some(result),
        _ = drained(&mut drain) => None,
    };

    heartbeat_handle.abort();

    match outcome {
        Some(Ok(())) => {
            breakers.record(&queue, &job_type, true);
            observability::queue::record_duration(&queue, start.elapsed());
            match backend.ack(&reservation).await {
                Ok(()) => {
                    observability::queue::record_completed(&queue, JobOutcome::Acked);
                    debug!(job_id = %reservation.job.id, queue = %queue, "Job completed");
                }
                Err(e) => {
                    // The reservation may have been reclaimed mid-flight
                    warn!(job_id = %reservation.job.id, error = %e, "Ack failed");
                }
            }
        }
        Some(Err(e)) => {
            breakers.record(&queue, &job_type, false);
            observability::queue::record_duration(&queue, start.elapsed());
            handle_failure(&backend, &reservation, &queue, limits.max_retries, e).await;
        }
        None => {
            // Operator-initiated cancellation: the retry counter is unchanged
            info!(job_id = %reservation.job.id, queue = %queue, "Job cancelled by drain");
            if let Err(e) = backend.release_reservation(&reservation).await {
                warn!(job_id = %reservation.job.id, error = %e, "Release after drain failed");
            }
            observability::queue::record_completed(&queue, JobOutcome::Skipped);
        }
    }
}

async fn run_handler(
    handler: Option<Arc<dyn JobHandler>>,
    reservation: &Reservation,
    timeout: Duration,
) -> WorkerResult<()> {
    let Some(handler) = handler else {
        return Err(WorkerError::UnknownJobType(
            reservation.job.job_type.clone(),
        ));
    };

    match tokio::time::timeout(timeout, handler.handle(&reservation.job)).await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::HandlerTimeout(timeout)),
    }
}

async fn handle_failure(
    backend: &Arc<dyn QueueBackend>,
    reservation: &Reservation,
    queue: &str,
    max_retries: u32,
    error: WorkerError,
) {
    let job = &reservation.job;

    if job.retry_count < max_retries {
        warn!(
            job_id = %job.id,
            queue = %queue,
            retry_count = job.retry_count,
            error = %error,
            "Job failed, scheduling retry"
        );
        if let Err(e) = backend.nack(reservation, true).await {
            warn!(job_id = %job.id, error = %e, "Nack failed");
        }
        observability::queue::record_completed(queue, JobOutcome::Retried);
    } else {
        error!(
            job_id = %job.id,
            queue = %queue,
            retry_count = job.retry_count,
            error = %error,
            "Retries exhausted, dead-lettering job"
        );
        // The terminal failure counts too: a dead-lettered job carries
        // retry_count = max_retries + 1
        let mut terminal = reservation.clone();
        terminal.job.retry_count += 1;
        if let Err(e) = backend.move_job(&terminal, &dlq_name(queue)).await {
            error!(job_id = %job.id, error = %e, "Dead-letter move failed");
        }
        observability::queue::record_completed(queue, JobOutcome::DeadLettered);
    }
}

/// Extend the reservation every `interval` until stopped or unsupported.
async fn heartbeat_loop(
    backend: Arc<dyn QueueBackend>,
    reservation: Reservation,
    interval: Duration,
    visibility: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;

        let extension = chrono::Duration::from_std(visibility)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        match backend
            .extend_reservation(&reservation, Utc::now() + extension)
            .await
        {
            Ok(()) => {
                debug!(job_id = %reservation.job.id, "Heartbeat extended reservation");
            }
            Err(BackendError::OperationNotSupported { .. }) => {
                // Best-effort from here on; the reaper may re-deliver
                warn!(
                    job_id = %reservation.job.id,
                    "Backend does not support heartbeats, continuing without"
                );
                break;
            }
            Err(e) if e.is_retryable() => {
                warn!(job_id = %reservation.job.id, error = %e, "Heartbeat failed, will retry");
            }
            Err(e) => {
                debug!(job_id = %reservation.job.id, error = %e, "Reservation gone, heartbeat stopping");
                break;
            }
        }
    }
}

/// Resolves when the drain signal flips to true.
async fn drained(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without draining; never resolve
            std::future::pending::<()>().await;
        }
    }
}
