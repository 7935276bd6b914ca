//! In-process queue provider.
//!
//! Implements the full contract (priority ordering, visibility deadlines,
//! delayed re-delivery, DLQ shape) against process memory. Used by tests and
//! local development; declares `persistence: false`.
//!
//! Delay and visibility bookkeeping uses `tokio::time::Instant`, so tests
//! running under `#[tokio::test(start_paused = true)]` observe exact timing.

use crate::backend::{BackendKind, IterOptions, IterOrder, QueueBackend};
use crate::capabilities::Capabilities;
use crate::config::QueueConfig;
use crate::error::{BackendError, BackendResult};
use crate::job::{Job, Priority, Reservation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Poll cadence of the reserve loop.
const RESERVE_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct QueueState {
    config: Option<QueueConfig>,
    /// Front = next to deliver
    pending: HashMap<Priority, VecDeque<Uuid>>,
    delayed: Vec<(Instant, Uuid)>,
    processing: HashMap<Uuid, (String, Instant)>,
    jobs: HashMap<Uuid, Job>,
}

impl QueueState {
    fn config_or_default(&self, queue: &str) -> QueueConfig {
        self.config
            .clone()
            .unwrap_or_else(|| QueueConfig::new(queue))
    }

    /// Promote due delayed jobs and reclaim expired reservations.
    /// Both transitions put the job at the head of its priority class.
    fn tick(&mut self, now: Instant) -> usize {
        let mut changed = 0;

        let due: Vec<Uuid> = {
            let (due, rest): (Vec<_>, Vec<_>) =
                self.delayed.drain(..).partition(|(at, _)| *at <= now);
            self.delayed = rest;
            due.into_iter().map(|(_, id)| id).collect()
        };
        for id in due {
            if let Some(job) = self.jobs.get(&id) {
                self.pending.entry(job.priority).or_default().push_front(id);
                changed += 1;
            }
        }

        let expired: Vec<Uuid> = self
            .processing
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.processing.remove(&id);
            if let Some(job) = self.jobs.get_mut(&id) {
                job.retry_count += 1;
                self.pending.entry(job.priority).or_default().push_front(id);
                changed += 1;
            }
        }

        changed
    }

    fn pop_highest(&mut self) -> Option<Uuid> {
        for priority in Priority::DESCENDING {
            if let Some(queue) = self.pending.get_mut(&priority) {
                if let Some(id) = queue.pop_front() {
                    return Some(id);
                }
            }
        }
        None
    }

    fn pending_len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }
}

/// In-memory queue provider.
pub struct MemoryBackend {
    name: String,
    capabilities: Capabilities,
    queues: Mutex<HashMap<String, QueueState>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Capabilities::memory(),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Advertise a different capability profile (tests standing in for a
    /// durable store).
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Number of reserved jobs across all consumers of a queue (test helper).
    pub fn processing_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|state| state.processing.len())
            .unwrap_or(0)
    }

    /// Number of delayed jobs awaiting promotion (test helper).
    pub fn delayed_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(|state| state.delayed.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn configure_queue(&self, config: QueueConfig) -> BackendResult<()> {
        config.validate()?;
        let mut queues = self.queues.lock().unwrap();
        let name = config.name.clone();
        queues.entry(name).or_default().config = Some(config);
        Ok(())
    }

    async fn queue_config(&self, queue: &str) -> BackendResult<QueueConfig> {
        let queues = self.queues.lock().unwrap();
        queues
            .get(queue)
            .and_then(|state| state.config.clone())
            .ok_or_else(|| BackendError::QueueNotFound(queue.to_string()))
    }

    async fn queues(&self) -> BackendResult<Vec<String>> {
        let queues = self.queues.lock().unwrap();
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn enqueue(&self, job: &Job) -> BackendResult<String> {
        let mut queues = self.queues.lock().unwrap();
        let state = queues.entry(job.queue.clone()).or_default();

        // Idempotent enqueue: the same id stores one copy
        if state.jobs.contains_key(&job.id) {
            return Ok(job.id.to_string());
        }

        state.jobs.insert(job.id, job.clone());
        state
            .pending
            .entry(job.priority)
            .or_default()
            .push_back(job.id);

        observability::queue::record_enqueued(&job.queue, job.priority.as_str());
        Ok(job.id.to_string())
    }

    async fn reserve(
        &self,
        queues: &[String],
        consumer_id: &str,
        timeout: Duration,
        count: usize,
    ) -> BackendResult<Vec<Reservation>> {
        if queues.is_empty() || count == 0 {
            return Ok(vec![]);
        }

        let give_up = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            let mut reservations = Vec::new();

            {
                let mut map = self.queues.lock().unwrap();
                for queue in queues {
                    let Some(state) = map.get_mut(queue) else { continue };
                    state.tick(now);
                    let visibility = state.config_or_default(queue).visibility_timeout;

                    while reservations.len() < count {
                        let Some(id) = state.pop_highest() else { break };
                        let Some(job) = state.jobs.get(&id).cloned() else { continue };
                        let deadline_instant = now + visibility;
                        state
                            .processing
                            .insert(id, (consumer_id.to_string(), deadline_instant));
                        reservations.push(Reservation {
                            job,
                            consumer_id: consumer_id.to_string(),
                            deadline: Utc::now()
                                + chrono::Duration::from_std(visibility)
                                    .unwrap_or_else(|_| chrono::Duration::seconds(30)),
                            handle: id.to_string(),
                        });
                    }
                    if reservations.len() >= count {
                        break;
                    }
                }
            }

            if !reservations.is_empty() {
                return Ok(reservations);
            }
            if Instant::now() >= give_up {
                return Ok(vec![]);
            }
            let remaining = give_up - Instant::now();
            tokio::time::sleep(remaining.min(RESERVE_POLL_INTERVAL)).await;
        }
    }

    async fn ack(&self, reservation: &Reservation) -> BackendResult<()> {
        let mut map = self.queues.lock().unwrap();
        let state = map
            .get_mut(reservation.queue())
            .ok_or_else(|| BackendError::QueueNotFound(reservation.queue().to_string()))?;

        if state.processing.remove(&reservation.job.id).is_none() {
            if state.jobs.contains_key(&reservation.job.id) {
                return Err(BackendError::JobProcessing(reservation.job.id));
            }
            return Err(BackendError::JobAlreadyAcked(reservation.job.id));
        }
        state.jobs.remove(&reservation.job.id);
        Ok(())
    }

    async fn nack(&self, reservation: &Reservation, requeue: bool) -> BackendResult<()> {
        let mut map = self.queues.lock().unwrap();
        let queue = reservation.queue();
        let state = map
            .get_mut(queue)
            .ok_or_else(|| BackendError::QueueNotFound(queue.to_string()))?;

        if state.processing.remove(&reservation.job.id).is_none() {
            if state.jobs.contains_key(&reservation.job.id) {
                return Err(BackendError::JobProcessing(reservation.job.id));
            }
            return Err(BackendError::JobAlreadyAcked(reservation.job.id));
        }

        if !requeue {
            // The job body stays for move_job-driven DLQ handling
            return Ok(());
        }

        let config = state.config_or_default(queue);
        let delay = config.dlq.backoff.delay_for(reservation.job.retry_count);

        let id = reservation.job.id;
        if let Some(job) = state.jobs.get_mut(&id) {
            job.retry_count += 1;
        }

        if delay.is_zero() {
            let priority = reservation.job.priority;
            state.pending.entry(priority).or_default().push_front(id);
        } else {
            state.delayed.push((Instant::now() + delay, id));
        }

        observability::queue::record_retry(queue, reservation.job.retry_count + 1);
        Ok(())
    }

    async fn release_reservation(&self, reservation: &Reservation) -> BackendResult<()> {
        let mut map = self.queues.lock().unwrap();
        let state = map
            .get_mut(reservation.queue())
            .ok_or_else(|| BackendError::QueueNotFound(reservation.queue().to_string()))?;

        if state.processing.remove(&reservation.job.id).is_none() {
            return Err(BackendError::JobNotFound(reservation.job.id));
        }
        state
            .pending
            .entry(reservation.job.priority)
            .or_default()
            .push_front(reservation.job.id);
        Ok(())
    }

    async fn extend_reservation(
        &self,
        reservation: &Reservation,
        deadline: DateTime<Utc>,
    ) -> BackendResult<()> {
        let mut map = self.queues.lock().unwrap();
        let state = map
            .get_mut(reservation.queue())
            .ok_or_else(|| BackendError::QueueNotFound(reservation.queue().to_string()))?;

        match state.processing.get_mut(&reservation.job.id) {
            Some((_, instant)) => {
                let extension = (deadline - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::from_secs(0));
                *instant = Instant::now() + extension;
                Ok(())
            }
            None => Err(BackendError::JobNotFound(reservation.job.id)),
        }
    }

    async fn peek(&self, queue: &str, offset: usize) -> BackendResult<Option<Job>> {
        let map = self.queues.lock().unwrap();
        let Some(state) = map.get(queue) else {
            return Ok(None);
        };

        let mut offset = offset;
        for priority in Priority::DESCENDING {
            if let Some(ids) = state.pending.get(&priority) {
                if offset < ids.len() {
                    return Ok(ids.get(offset).and_then(|id| state.jobs.get(id)).cloned());
                }
                offset -= ids.len();
            }
        }
        Ok(None)
    }

    async fn len(&self, queue: &str) -> BackendResult<usize> {
        let map = self.queues.lock().unwrap();
        Ok(map.get(queue).map(QueueState::pending_len).unwrap_or(0))
    }

    async fn move_job(&self, reservation: &Reservation, target_queue: &str) -> BackendResult<()> {
        let mut map = self.queues.lock().unwrap();
        let source = reservation.queue();

        {
            let state = map
                .get_mut(source)
                .ok_or_else(|| BackendError::QueueNotFound(source.to_string()))?;
            state.processing.remove(&reservation.job.id);
            state
                .jobs
                .remove(&reservation.job.id)
                .ok_or(BackendError::JobNotFound(reservation.job.id))?;
        }
        // The reservation holder's copy is authoritative (it may carry a
        // bumped retry counter for a terminal failure)
        let mut job = reservation.job.clone();
        job.queue = target_queue.to_string();

        let target = map.entry(target_queue.to_string()).or_default();
        target
            .pending
            .entry(job.priority)
            .or_default()
            .push_back(job.id);
        target.jobs.insert(job.id, job);
        Ok(())
    }

    async fn iter(
        &self,
        queue: &str,
        opts: IterOptions,
    ) -> BackendResult<BoxStream<'static, BackendResult<Job>>> {
        let map = self.queues.lock().unwrap();
        let mut jobs: Vec<Job> = Vec::new();

        if let Some(state) = map.get(queue) {
            for priority in Priority::DESCENDING {
                if let Some(ids) = state.pending.get(&priority) {
                    for id in ids {
                        if let Some(job) = state.jobs.get(id) {
                            if opts.contains(job.created_at) {
                                jobs.push(job.clone());
                            }
                        }
                    }
                }
            }
        }

        if opts.order == IterOrder::NewestFirst {
            jobs.reverse();
        }
        if let Some(limit) = opts.limit {
            jobs.truncate(limit);
        }

        Ok(futures::stream::iter(jobs.into_iter().map(Ok)).boxed())
    }

    async fn reclaim_expired(&self, queue: &str) -> BackendResult<usize> {
        let mut map = self.queues.lock().unwrap();
        Ok(map
            .get_mut(queue)
            .map(|state| state.tick(Instant::now()))
            .unwrap_or(0))
    }

    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }
}
