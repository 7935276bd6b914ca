//! Redis list provider.
//!
//! Layout per queue:
//! - `{prefix}:queue:{name}:pending:{priority}` - LIST of job ids, LPUSH on
//!   enqueue, RPOP on reserve (FIFO within a priority class)
//! - `{prefix}:queue:{name}:data` - HASH of job id -> serialized job
//! - `{prefix}:queue:{name}:processing:{consumer}` - ZSET of reserved job ids
//!   scored by visibility deadline (epoch millis)
//! - `{prefix}:queue:{name}:delayed` - ZSET of job ids scored by deliver-at
//! - `{prefix}:queue:{name}:consumers` - SET of consumer ids with live
//!   processing sets
//! - `{prefix}:queue:{name}:config` - serialized `QueueConfig`
//!
//! Multi-key transitions run as server-side scripts so each state change is
//! atomic. A `Reaper` periodically calls [`reclaim_expired`] to re-deliver
//! reservations whose deadline passed and to promote due delayed jobs.
//!
//! [`reclaim_expired`]: crate::backend::QueueBackend::reclaim_expired

use crate::backend::{BackendKind, IterOptions, IterOrder, QueueBackend};
use crate::capabilities::Capabilities;
use crate::config::QueueConfig;
use crate::error::{BackendError, BackendResult};
use crate::job::{Job, Priority, Reservation};
use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// How often the reserve loop polls when every list is empty.
const RESERVE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Page size for iteration and batched lookups.
const ITER_PAGE: usize = 100;

/// Atomically pop up to `count` ids from one pending list into a consumer's
/// processing set, returning the job bodies.
const RESERVE_SCRIPT: &str = r#"
local out = {}
for _ = 1, tonumber(ARGV[3]) do
  local id = redis.call('RPOP', KEYS[1])
  if not id then break end
  local body = redis.call('HGET', KEYS[2], id)
  if body then
    redis.call('ZADD', KEYS[3], ARGV[1], id)
    out[#out + 1] = body
  end
end
if #out > 0 then
  redis.call('SADD', KEYS[4], ARGV[2])
end
return out
"#;

/// Remove a reservation and delete the job.
/// Returns 1 = acked, -1 = reservation lost but job live (reclaimed), 0 = gone.
const ACK_SCRIPT: &str = r#"
local removed = redis.call('ZREM', KEYS[1], ARGV[1])
if removed == 1 then
  redis.call('HDEL', KEYS[2], ARGV[1])
  return 1
end
if redis.call('HEXISTS', KEYS[2], ARGV[1]) == 1 then
  return -1
end
return 0
"#;

/// Remove a reservation and requeue the updated body, delayed or immediate.
/// Same return codes as ACK_SCRIPT.
const NACK_REQUEUE_SCRIPT: &str = r#"
local removed = redis.call('ZREM', KEYS[1], ARGV[1])
if removed == 0 then
  if redis.call('HEXISTS', KEYS[2], ARGV[1]) == 1 then
    return -1
  end
  return 0
end
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
if tonumber(ARGV[3]) > tonumber(ARGV[4]) then
  redis.call('ZADD', KEYS[4], ARGV[3], ARGV[1])
else
  redis.call('RPUSH', KEYS[3], ARGV[1])
end
return 1
"#;

/// Remove a reservation, leaving the job body for DLQ handling.
const NACK_DROP_SCRIPT: &str = r#"
local removed = redis.call('ZREM', KEYS[1], ARGV[1])
if removed == 1 then
  return 1
end
if redis.call('HEXISTS', KEYS[2], ARGV[1]) == 1 then
  return -1
end
return 0
"#;

/// Transfer a job out of its source queue into a target queue's pending list.
/// Returns 0 when the job body is gone.
const MOVE_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
if redis.call('HDEL', KEYS[3], ARGV[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[4], ARGV[1], ARGV[2])
redis.call('LPUSH', KEYS[5], ARGV[1])
return 1
"#;

/// Extend a live reservation's deadline. Returns 0 when the reservation is gone.
const EXTEND_SCRIPT: &str = r#"
if redis.call('ZSCORE', KEYS[1], ARGV[2]) then
  redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
  return 1
end
return 0
"#;

/// Move reservations past their deadline back to the head of their priority
/// list with retry_count incremented.
const RECLAIM_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
local n = 0
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  local body = redis.call('HGET', KEYS[2], id)
  if body then
    local job = cjson.decode(body)
    job['retry_count'] = (job['retry_count'] or 0) + 1
    redis.call('HSET', KEYS[2], id, cjson.encode(job))
    redis.call('RPUSH', ARGV[2] .. job['priority'], id)
    n = n + 1
  end
end
return n
"#;

/// Promote due delayed jobs to the head of their priority list.
const PROMOTE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
local n = 0
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  local body = redis.call('HGET', KEYS[2], id)
  if body then
    local job = cjson.decode(body)
    redis.call('RPUSH', ARGV[2] .. job['priority'], id)
    n = n + 1
  end
end
return n
"#;

struct Scripts {
    reserve: Script,
    ack: Script,
    nack_requeue: Script,
    nack_drop: Script,
    move_job: Script,
    extend: Script,
    reclaim: Script,
    promote: Script,
}

impl Scripts {
    fn new() -> Self {
        Self {
            reserve: Script::new(RESERVE_SCRIPT),
            ack: Script::new(ACK_SCRIPT),
            nack_requeue: Script::new(NACK_REQUEUE_SCRIPT),
            nack_drop: Script::new(NACK_DROP_SCRIPT),
            move_job: Script::new(MOVE_SCRIPT),
            extend: Script::new(EXTEND_SCRIPT),
            reclaim: Script::new(RECLAIM_SCRIPT),
            promote: Script::new(PROMOTE_SCRIPT),
        }
    }
}

/// Key scheme shared by all list-backend instances.
#[derive(Debug, Clone)]
struct ListKeys {
    prefix: String,
}

impl ListKeys {
    fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn queues(&self) -> String {
        format!("{}:queues", self.prefix)
    }

    fn config(&self, queue: &str) -> String {
        format!("{}:queue:{}:config", self.prefix, queue)
    }

    fn pending(&self, queue: &str, priority: Priority) -> String {
        format!("{}:queue:{}:pending:{}", self.prefix, queue, priority)
    }

    fn pending_prefix(&self, queue: &str) -> String {
        format!("{}:queue:{}:pending:", self.prefix, queue)
    }

    fn data(&self, queue: &str) -> String {
        format!("{}:queue:{}:data", self.prefix, queue)
    }

    fn processing(&self, queue: &str, consumer: &str) -> String {
        format!("{}:queue:{}:processing:{}", self.prefix, queue, consumer)
    }

    fn consumers(&self, queue: &str) -> String {
        format!("{}:queue:{}:consumers", self.prefix, queue)
    }

    fn delayed(&self, queue: &str) -> String {
        format!("{}:queue:{}:delayed", self.prefix, queue)
    }
}

/// Redis list-backed queue provider.
pub struct ListBackend {
    name: String,
    keys: ListKeys,
    redis: ConnectionManager,
    scripts: Scripts,
    /// Config cache; the store remains the source of truth
    configs: RwLock<HashMap<String, QueueConfig>>,
}

impl ListBackend {
    pub fn new(name: impl Into<String>, redis: ConnectionManager) -> Self {
        Self {
            name: name.into(),
            keys: ListKeys::new("cq"),
            redis,
            scripts: Scripts::new(),
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Override the key prefix (default "cq").
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keys = ListKeys::new(prefix);
        self
    }

    fn conn(&self) -> ConnectionManager {
        self.redis.clone()
    }

    /// Queue config, falling back to defaults for queues written to without
    /// explicit configuration (DLQs in particular).
    async fn config_or_default(&self, queue: &str) -> QueueConfig {
        if let Some(config) = self.configs.read().unwrap().get(queue).cloned() {
            return config;
        }
        match self.load_config(queue).await {
            Ok(Some(config)) => {
                self.configs
                    .write()
                    .unwrap()
                    .insert(queue.to_string(), config.clone());
                config
            }
            _ => QueueConfig::new(queue),
        }
    }

    async fn load_config(&self, queue: &str) -> BackendResult<Option<QueueConfig>> {
        let mut conn = self.conn();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.keys.config(queue))
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Run the promote script for one queue.
    async fn promote_delayed(&self, queue: &str) -> BackendResult<usize> {
        let mut conn = self.conn();
        let promoted: usize = self
            .scripts
            .promote
            .key(self.keys.delayed(queue))
            .key(self.keys.data(queue))
            .arg(Utc::now().timestamp_millis())
            .arg(self.keys.pending_prefix(queue))
            .invoke_async(&mut conn)
            .await?;
        Ok(promoted)
    }

    /// Try one non-blocking reservation sweep across queues and priorities.
    async fn try_reserve(
        &self,
        queues: &[String],
        consumer_id: &str,
        count: usize,
    ) -> BackendResult<Vec<Reservation>> {
        let mut reservations = Vec::new();

        for queue in queues {
            if reservations.len() >= count {
                break;
            }
            let config = self.config_or_default(queue).await;
            let deadline = Utc::now()
                + chrono::Duration::from_std(config.visibility_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));

            for priority in Priority::DESCENDING {
                let remaining = count - reservations.len();
                if remaining == 0 {
                    break;
                }

                let mut conn = self.conn();
                let bodies: Vec<String> = self
                    .scripts
                    .reserve
                    .key(self.keys.pending(queue, priority))
                    .key(self.keys.data(queue))
                    .key(self.keys.processing(queue, consumer_id))
                    .key(self.keys.consumers(queue))
                    .arg(deadline.timestamp_millis())
                    .arg(consumer_id)
                    .arg(remaining)
                    .invoke_async(&mut conn)
                    .await?;

                for body in bodies {
                    let job: Job = serde_json::from_str(&body)
                        .map_err(|e| BackendError::InvalidJobData(e.to_string()))?;
                    let handle = job.id.to_string();
                    reservations.push(Reservation {
                        job,
                        consumer_id: consumer_id.to_string(),
                        deadline,
                        handle,
                    });
                }
            }
        }

        Ok(reservations)
    }

    /// Map a script status code to the contract errors.
    fn status_to_result(status: i64, job_id: Uuid) -> BackendResult<()> {
        match status {
            1 => Ok(()),
            -1 => Err(BackendError::JobProcessing(job_id)),
            _ => Err(BackendError::JobAlreadyAcked(job_id)),
        }
    }
}

#[async_trait]
impl QueueBackend for ListBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::List
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::list()
    }

    async fn configure_queue(&self, config: QueueConfig) -> BackendResult<()> {
        config.validate()?;
        let mut conn = self.conn();
        let raw = serde_json::to_string(&config)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(self.keys.config(&config.name))
            .arg(&raw)
            .ignore()
            .cmd("SADD")
            .arg(self.keys.queues())
            .arg(&config.name)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        self.configs
            .write()
            .unwrap()
            .insert(config.name.clone(), config);
        Ok(())
    }

    async fn queue_config(&self, queue: &str) -> BackendResult<QueueConfig> {
        match self.load_config(queue).await? {
            Some(config) => Ok(config),
            None => Err(BackendError::QueueNotFound(queue.to_string())),
        }
    }

    async fn queues(&self) -> BackendResult<Vec<String>> {
        let mut conn = self.conn();
        let mut queues: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.keys.queues())
            .query_async(&mut conn)
            .await?;
        queues.sort();
        Ok(queues)
    }

    async fn enqueue(&self, job: &Job) -> BackendResult<String> {
        let body = serde_json::to_string(job)?;
        let id = job.id.to_string();
        let mut conn = self.conn();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(self.keys.data(&job.queue))
            .arg(&id)
            .arg(&body)
            .ignore()
            .cmd("LPUSH")
            .arg(self.keys.pending(&job.queue, job.priority))
            .arg(&id)
            .ignore()
            .cmd("SADD")
            .arg(self.keys.queues())
            .arg(&job.queue)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        observability::queue::record_enqueued(&job.queue, job.priority.as_str());
        debug!(job_id = %job.id, queue = %job.queue, priority = %job.priority, "Enqueued job");
        Ok(id)
    }

    async fn enqueue_batch(&self, jobs: &[Job]) -> BackendResult<Vec<String>> {
        if jobs.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut ids = Vec::with_capacity(jobs.len());

        for job in jobs {
            let body = serde_json::to_string(job)?;
            let id = job.id.to_string();
            pipe.cmd("HSET")
                .arg(self.keys.data(&job.queue))
                .arg(&id)
                .arg(&body)
                .ignore()
                .cmd("LPUSH")
                .arg(self.keys.pending(&job.queue, job.priority))
                .arg(&id)
                .ignore()
                .cmd("SADD")
                .arg(self.keys.queues())
                .arg(&job.queue)
                .ignore();
            ids.push(id);
        }

        let _: () = pipe.query_async(&mut conn).await?;

        for job in jobs {
            observability::queue::record_enqueued(&job.queue, job.priority.as_str());
        }
        debug!(count = jobs.len(), "Enqueued job batch");
        Ok(ids)
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

        let give_up = tokio::time::Instant::now() + timeout;

        loop {
            for queue in queues {
                // Keep delayed jobs flowing even between reaper passes
                let _ = self.promote_delayed(queue).await;
            }

            let reservations = self.try_reserve(queues, consumer_id, count).await?;
            if !reservations.is_empty() {
                return Ok(reservations);
            }

            if tokio::time::Instant::now() >= give_up {
                return Ok(vec![]);
            }
            let remaining = give_up - tokio::time::Instant::now();
            tokio::time::sleep(remaining.min(RESERVE_POLL_INTERVAL)).await;
        }
    }

    async fn ack(&self, reservation: &Reservation) -> BackendResult<()> {
        let queue = reservation.queue();
        let mut conn = self.conn();
        let status: i64 = self
            .scripts
            .ack
            .key(self.keys.processing(queue, &reservation.consumer_id))
            .key(self.keys.data(queue))
            .arg(reservation.job.id.to_string())
            .invoke_async(&mut conn)
            .await?;

        Self::status_to_result(status, reservation.job.id)?;
        debug!(job_id = %reservation.job.id, queue = %queue, "Acked job");
        Ok(())
    }

    async fn nack(&self, reservation: &Reservation, requeue: bool) -> BackendResult<()> {
        let queue = reservation.queue();
        let job_id = reservation.job.id;
        let mut conn = self.conn();

        if !requeue {
            let status: i64 = self
                .scripts
                .nack_drop
                .key(self.keys.processing(queue, &reservation.consumer_id))
                .key(self.keys.data(queue))
                .arg(job_id.to_string())
                .invoke_async(&mut conn)
                .await?;
            return Self::status_to_result(status, job_id);
        }

        let config = self.config_or_default(queue).await;
        let retried = reservation.job.with_retry();
        let delay = config.dlq.backoff.delay_for(reservation.job.retry_count);
        let now = Utc::now();
        let deliver_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(0));
        let body = serde_json::to_string(&retried)?;

        let status: i64 = self
            .scripts
            .nack_requeue
            .key(self.keys.processing(queue, &reservation.consumer_id))
            .key(self.keys.data(queue))
            .key(self.keys.pending(queue, retried.priority))
            .key(self.keys.delayed(queue))
            .arg(job_id.to_string())
            .arg(&body)
            .arg(deliver_at.timestamp_millis())
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        Self::status_to_result(status, job_id)?;
        observability::queue::record_retry(queue, retried.retry_count);
        debug!(
            job_id = %job_id,
            queue = %queue,
            retry_count = retried.retry_count,
            delay_ms = delay.as_millis() as u64,
            "Requeued job"
        );
        Ok(())
    }

    async fn release_reservation(&self, reservation: &Reservation) -> BackendResult<()> {
        let queue = reservation.queue();
        let job_id = reservation.job.id;
        let body = serde_json::to_string(&reservation.job)?;
        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn();

        // Immediate head requeue with the body (and retry counter) unchanged
        let status: i64 = self
            .scripts
            .nack_requeue
            .key(self.keys.processing(queue, &reservation.consumer_id))
            .key(self.keys.data(queue))
            .key(self.keys.pending(queue, reservation.job.priority))
            .key(self.keys.delayed(queue))
            .arg(job_id.to_string())
            .arg(&body)
            .arg(now)
            .arg(now)
            .invoke_async(&mut conn)
            .await?;

        Self::status_to_result(status, job_id)
    }

    async fn extend_reservation(
        &self,
        reservation: &Reservation,
        deadline: DateTime<Utc>,
    ) -> BackendResult<()> {
        let mut conn = self.conn();
        let status: i64 = self
            .scripts
            .extend
            .key(self.keys.processing(reservation.queue(), &reservation.consumer_id))
            .arg(deadline.timestamp_millis())
            .arg(reservation.job.id.to_string())
            .invoke_async(&mut conn)
            .await?;

        if status == 1 {
            Ok(())
        } else {
            Err(BackendError::JobNotFound(reservation.job.id))
        }
    }

    async fn peek(&self, queue: &str, offset: usize) -> BackendResult<Option<Job>> {
        let mut conn = self.conn();
        let mut offset = offset as isize;

        for priority in Priority::DESCENDING {
            let key = self.keys.pending(queue, priority);
            let len: isize = redis::cmd("LLEN").arg(&key).query_async(&mut conn).await?;
            if offset < len {
                // Delivery order pops from the right, so offset 0 is index -1
                let id: Option<String> = redis::cmd("LINDEX")
                    .arg(&key)
                    .arg(-1 - offset)
                    .query_async(&mut conn)
                    .await?;
                let Some(id) = id else { return Ok(None) };
                let body: Option<String> = redis::cmd("HGET")
                    .arg(self.keys.data(queue))
                    .arg(&id)
                    .query_async(&mut conn)
                    .await?;
                return match body {
                    Some(body) => Ok(Some(serde_json::from_str(&body)?)),
                    None => Ok(None),
                };
            }
            offset -= len;
        }

        Ok(None)
    }

    async fn len(&self, queue: &str) -> BackendResult<usize> {
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        for priority in Priority::DESCENDING {
            pipe.cmd("LLEN").arg(self.keys.pending(queue, priority));
        }
        let lens: Vec<usize> = pipe.query_async(&mut conn).await?;
        Ok(lens.iter().sum())
    }

    async fn move_job(&self, reservation: &Reservation, target_queue: &str) -> BackendResult<()> {
        let source = reservation.queue();
        let mut moved = reservation.job.clone();
        moved.queue = target_queue.to_string();
        let body = serde_json::to_string(&moved)?;

        let mut conn = self.conn();
        let status: i64 = self
            .scripts
            .move_job
            .key(self.keys.processing(source, &reservation.consumer_id))
            .key(self.keys.delayed(source))
            .key(self.keys.data(source))
            .key(self.keys.data(target_queue))
            .key(self.keys.pending(target_queue, moved.priority))
            .arg(moved.id.to_string())
            .arg(&body)
            .invoke_async(&mut conn)
            .await?;

        if status == 0 {
            return Err(BackendError::JobNotFound(reservation.job.id));
        }

        let _: () = redis::cmd("SADD")
            .arg(self.keys.queues())
            .arg(target_queue)
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %moved.id, from = %source, to = %target_queue, "Moved job");
        Ok(())
    }

    async fn iter(
        &self,
        queue: &str,
        opts: IterOptions,
    ) -> BackendResult<BoxStream<'static, BackendResult<Job>>> {
        let mut conn = self.conn();
        let data_key = self.keys.data(queue);

        let priorities: Vec<Priority> = match opts.order {
            IterOrder::OldestFirst => Priority::DESCENDING.to_vec(),
            IterOrder::NewestFirst => {
                let mut p = Priority::DESCENDING.to_vec();
                p.reverse();
                p
            }
        };
        let pending_keys: Vec<String> = priorities
            .iter()
            .map(|p| self.keys.pending(queue, *p))
            .collect();

        let stream = try_stream! {
            let mut yielded = 0usize;

            'outer: for key in pending_keys {
                let ids: Vec<String> = redis::cmd("LRANGE")
                    .arg(&key)
                    .arg(0)
                    .arg(-1)
                    .query_async(&mut conn)
                    .await
                    .map_err(BackendError::Redis)?;

                // Delivery order is right-to-left for oldest-first
                let ordered: Vec<String> = match opts.order {
                    IterOrder::OldestFirst => ids.into_iter().rev().collect(),
                    IterOrder::NewestFirst => ids,
                };

                for chunk in ordered.chunks(ITER_PAGE) {
                    let mut cmd = redis::cmd("HMGET");
                    cmd.arg(&data_key);
                    for id in chunk {
                        cmd.arg(id);
                    }
                    let bodies: Vec<Option<String>> =
                        cmd.query_async(&mut conn).await.map_err(BackendError::Redis)?;

                    for body in bodies.into_iter().flatten() {
                        let job: Job = serde_json::from_str(&body)
                            .map_err(|e| BackendError::InvalidJobData(e.to_string()))?;
                        if !opts.contains(job.created_at) {
                            continue;
                        }
                        yield job;
                        yielded += 1;
                        if let Some(limit) = opts.limit {
                            if yielded >= limit {
                                break 'outer;
                            }
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn reclaim_expired(&self, queue: &str) -> BackendResult<usize> {
        let mut total = self.promote_delayed(queue).await?;
        let now = Utc::now().timestamp_millis();

        let mut conn = self.conn();
        let consumers: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.keys.consumers(queue))
            .query_async(&mut conn)
            .await?;

        for consumer in consumers {
            let reclaimed: usize = self
                .scripts
                .reclaim
                .key(self.keys.processing(queue, &consumer))
                .key(self.keys.data(queue))
                .arg(now)
                .arg(self.keys.pending_prefix(queue))
                .invoke_async(&mut conn)
                .await?;

            if reclaimed > 0 {
                warn!(
                    queue = %queue,
                    consumer = %consumer,
                    count = reclaimed,
                    "Reclaimed expired reservations"
                );
            }
            total += reclaimed;
        }

        Ok(total)
    }

    async fn health_check(&self) -> BackendResult<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_scheme() {
        let keys = ListKeys::new("cq");
        assert_eq!(
            keys.pending("emails", Priority::High),
            "cq:queue:emails:pending:high"
        );
        assert_eq!(keys.data("emails"), "cq:queue:emails:data");
        assert_eq!(
            keys.processing("emails", "w-1"),
            "cq:queue:emails:processing:w-1"
        );
        assert_eq!(keys.delayed("emails"), "cq:queue:emails:delayed");
        assert_eq!(keys.queues(), "cq:queues");
    }

    #[test]
    fn test_prefix_override() {
        let keys = ListKeys::new("jobs");
        assert_eq!(keys.pending("q", Priority::Low), "jobs:queue:q:pending:low");
        assert_eq!(keys.pending_prefix("q"), "jobs:queue:q:pending:");
    }

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert!(ListBackend::status_to_result(1, id).is_ok());
        assert!(matches!(
            ListBackend::status_to_result(-1, id),
            Err(BackendError::JobProcessing(_))
        ));
        assert!(matches!(
            ListBackend::status_to_result(0, id),
            Err(BackendError::JobAlreadyAcked(_))
        ));
    }
}
