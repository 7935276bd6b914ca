//! Redis stream provider.
//!
//! Layout per queue:
//! - `{prefix}:queue:{name}:stream:{priority}` - one stream per priority
//!   class, entries carry a single `job` field with the serialized job
//! - `{prefix}:queue:{name}:delayed` - ZSET of serialized jobs scored by
//!   deliver-at (streams have no native delayed delivery)
//! - `{prefix}:queue:{name}:config` - serialized `QueueConfig`
//! - `{prefix}:queues` - SET of configured queue names
//!
//! One consumer group per worker pool is created on each priority stream
//! (`XGROUP CREATE ... MKSTREAM`, BUSYGROUP tolerated). Reservation uses a
//! single blocking `XREADGROUP` across all priority streams in descending
//! order, so the server performs the priority selection. `XAUTOCLAIM`
//! replaces the reaper for idle-pending entries.

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
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reservation handles are `{stream_key}|{entry_id}`; '|' never appears in
/// stream keys.
const HANDLE_SEPARATOR: char = '|';

/// Page size for XRANGE-based iteration.
const ITER_PAGE: usize = 100;

/// Key scheme shared by all stream-backend instances.
#[derive(Debug, Clone)]
struct StreamKeys {
    prefix: String,
}

impl StreamKeys {
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

    fn stream(&self, queue: &str, priority: Priority) -> String {
        format!("{}:queue:{}:stream:{}", self.prefix, queue, priority)
    }

    fn delayed(&self, queue: &str) -> String {
        format!("{}:queue:{}:delayed", self.prefix, queue)
    }
}

/// Redis stream-backed queue provider.
pub struct StreamBackend {
    name: String,
    keys: StreamKeys,
    redis: ConnectionManager,
    /// Consumer group shared by one worker pool
    group: String,
    configs: RwLock<HashMap<String, QueueConfig>>,
}

impl StreamBackend {
    pub fn new(name: impl Into<String>, redis: ConnectionManager) -> Self {
        Self {
            name: name.into(),
            keys: StreamKeys::new("sq"),
            redis,
            group: "workers".to_string(),
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Override the consumer group name (default "workers").
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Override the key prefix (default "sq").
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keys = StreamKeys::new(prefix);
        self
    }

    fn conn(&self) -> ConnectionManager {
        self.redis.clone()
    }

    fn parse_handle(handle: &str) -> BackendResult<(&str, &str)> {
        handle
            .rsplit_once(HANDLE_SEPARATOR)
            .ok_or_else(|| BackendError::InvalidJobData(format!("malformed handle '{}'", handle)))
    }

    /// Create the consumer group on every priority stream of a queue.
    ///
    /// Existing groups are tolerated (BUSYGROUP).
    pub async fn ensure_groups(&self, queue: &str) -> BackendResult<()> {
        let mut conn = self.conn();

        for priority in Priority::DESCENDING {
            let key = self.keys.stream(queue, priority);
            // Start at 0 so entries enqueued before the group existed are
            // still delivered
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&key)
                .arg(&self.group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => {
                    info!(stream = %key, group = %self.group, "Created consumer group");
                }
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(stream = %key, group = %self.group, "Consumer group already exists");
                }
                Err(e) => return Err(BackendError::Redis(e)),
            }
        }

        Ok(())
    }

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

    async fn add_entry(&self, queue: &str, job: &Job) -> BackendResult<String> {
        let config = self.config_or_default(queue).await;
        let body = serde_json::to_string(job)?;
        let key = self.keys.stream(queue, job.priority);
        let mut conn = self.conn();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&key);
        if let Some(max_entries) = config.retention.max_entries {
            // Approximate trimming is much cheaper than exact
            cmd.arg("MAXLEN").arg("~").arg(max_entries);
        }
        cmd.arg("*").arg("job").arg(&body);

        let entry_id: String = cmd.query_async(&mut conn).await?;
        Ok(format!("{}{}{}", key, HANDLE_SEPARATOR, entry_id))
    }

    /// Re-add due delayed jobs to their priority stream.
    async fn promote_delayed(&self, queue: &str) -> BackendResult<usize> {
        let mut conn = self.conn();
        let now = Utc::now().timestamp_millis();
        let delayed_key = self.keys.delayed(queue);

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&delayed_key)
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;
        for body in due {
            // Remove first so concurrent promoters cannot double-deliver
            let removed: usize = conn.zrem(&delayed_key, &body).await?;
            if removed == 0 {
                continue;
            }
            let job: Job = serde_json::from_str(&body)
                .map_err(|e| BackendError::InvalidJobData(e.to_string()))?;
            self.add_entry(queue, &job).await?;
            promoted += 1;
        }

        Ok(promoted)
    }

    fn parse_read_reply(
        &self,
        reply: StreamReadReply,
        consumer_id: &str,
        deadlines: &HashMap<String, DateTime<Utc>>,
        count: usize,
    ) -> Vec<Reservation> {
        let mut reservations = Vec::new();

        for stream_key in reply.keys {
            let deadline = deadlines
                .get(&stream_key.key)
                .copied()
                .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(30));
            for entry in stream_key.ids {
                if reservations.len() >= count {
                    break;
                }
                let Some(value) = entry.map.get("job") else {
                    warn!(entry_id = %entry.id, "Stream entry missing 'job' field");
                    continue;
                };
                let body = match value {
                    redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
                    redis::Value::SimpleString(s) => s.clone(),
                    _ => {
                        warn!(entry_id = %entry.id, "Stream entry has non-string 'job' field");
                        continue;
                    }
                };
                match serde_json::from_str::<Job>(&body) {
                    Ok(job) => reservations.push(Reservation {
                        job,
                        consumer_id: consumer_id.to_string(),
                        deadline,
                        handle: format!("{}{}{}", stream_key.key, HANDLE_SEPARATOR, entry.id),
                    }),
                    Err(e) => {
                        warn!(entry_id = %entry.id, error = %e, "Failed to parse job from stream");
                    }
                }
            }
        }

        reservations
    }
}

#[async_trait]
impl QueueBackend for StreamBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Stream
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::stream()
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

        self.ensure_groups(&config.name).await?;

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
        let mut conn = self.conn();
        let handle = self.add_entry(&job.queue, job).await?;
        let _: () = redis::cmd("SADD")
            .arg(self.keys.queues())
            .arg(&job.queue)
            .query_async(&mut conn)
            .await?;

        observability::queue::record_enqueued(&job.queue, job.priority.as_str());
        debug!(job_id = %job.id, queue = %job.queue, handle = %handle, "Enqueued job");
        Ok(handle)
    }

    async fn enqueue_batch(&self, jobs: &[Job]) -> BackendResult<Vec<String>> {
        if jobs.is_empty() {
            return Ok(vec![]);
        }

        // Group by (queue, priority) so one pipeline covers the batch
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        for job in jobs {
            let config = self.config_or_default(&job.queue).await;
            let body = serde_json::to_string(job)?;
            let key = self.keys.stream(&job.queue, job.priority);

            pipe.cmd("SADD")
                .arg(self.keys.queues())
                .arg(&job.queue)
                .ignore();
            pipe.cmd("XADD").arg(&key);
            if let Some(max_entries) = config.retention.max_entries {
                pipe.arg("MAXLEN").arg("~").arg(max_entries);
            }
            pipe.arg("*").arg("job").arg(&body);
        }

        let entry_ids: Vec<String> = pipe.query_async(&mut conn).await?;

        let handles = jobs
            .iter()
            .zip(entry_ids)
            .map(|(job, entry_id)| {
                observability::queue::record_enqueued(&job.queue, job.priority.as_str());
                format!(
                    "{}{}{}",
                    self.keys.stream(&job.queue, job.priority),
                    HANDLE_SEPARATOR,
                    entry_id
                )
            })
            .collect();
        Ok(handles)
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

        let mut stream_keys = Vec::new();
        let mut deadlines: HashMap<String, DateTime<Utc>> = HashMap::new();
        for queue in queues {
            let _ = self.promote_delayed(queue).await;
            let config = self.config_or_default(queue).await;
            let deadline = Utc::now()
                + chrono::Duration::from_std(config.visibility_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
            for priority in Priority::DESCENDING {
                let key = self.keys.stream(queue, priority);
                deadlines.insert(key.clone(), deadline);
                stream_keys.push(key);
            }
        }

        let ids: Vec<&str> = stream_keys.iter().map(|_| ">").collect();
        let mut opts = StreamReadOptions::default()
            .group(&self.group, consumer_id)
            .count(count);
        if !timeout.is_zero() {
            // BLOCK 0 would wait forever; zero timeout means one shot
            opts = opts.block(timeout.as_millis() as usize);
        }

        let mut conn = self.conn();
        let result: Result<StreamReadReply, _> =
            conn.xread_options(&stream_keys, &ids, &opts).await;

        match result {
            Ok(reply) => Ok(self.parse_read_reply(reply, consumer_id, &deadlines, count)),
            Err(e) => {
                let err = BackendError::Redis(e);
                if err.is_block_timeout() {
                    // No messages arrived within the block window
                    return Ok(vec![]);
                }
                if err.is_nogroup_error() {
                    // Group missing (fresh queue); create and report empty
                    for queue in queues {
                        self.ensure_groups(queue).await?;
                    }
                    return Ok(vec![]);
                }
                Err(err)
            }
        }
    }

    async fn ack(&self, reservation: &Reservation) -> BackendResult<()> {
        let (stream_key, entry_id) = Self::parse_handle(&reservation.handle)?;
        let mut conn = self.conn();

        let acked: usize = redis::cmd("XACK")
            .arg(stream_key)
            .arg(&self.group)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;
        if acked == 0 {
            return Err(BackendError::JobAlreadyAcked(reservation.job.id));
        }

        let _: () = redis::cmd("XDEL")
            .arg(stream_key)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %reservation.job.id, entry_id = %entry_id, "Acked job");
        Ok(())
    }

    async fn nack(&self, reservation: &Reservation, requeue: bool) -> BackendResult<()> {
        let (stream_key, entry_id) = Self::parse_handle(&reservation.handle)?;
        let queue = reservation.queue().to_string();
        let mut conn = self.conn();

        let acked: usize = redis::cmd("XACK")
            .arg(stream_key)
            .arg(&self.group)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;
        if acked == 0 {
            return Err(BackendError::JobAlreadyAcked(reservation.job.id));
        }
        let _: () = redis::cmd("XDEL")
            .arg(stream_key)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;

        if !requeue {
            // The job body lives on in the reservation; the caller follows
            // with move_job for DLQ handling.
            return Ok(());
        }

        let config = self.config_or_default(&queue).await;
        let retried = reservation.job.with_retry();
        let delay = config.dlq.backoff.delay_for(reservation.job.retry_count);

        if delay.is_zero() {
            self.add_entry(&queue, &retried).await?;
        } else {
            let deliver_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
            let body = serde_json::to_string(&retried)?;
            let _: () = conn.zadd(self.keys.delayed(&queue), body, deliver_at).await?;
        }

        observability::queue::record_retry(&queue, retried.retry_count);
        debug!(
            job_id = %retried.id,
            queue = %queue,
            retry_count = retried.retry_count,
            delay_ms = delay.as_millis() as u64,
            "Requeued job"
        );
        Ok(())
    }

    async fn release_reservation(&self, reservation: &Reservation) -> BackendResult<()> {
        let (stream_key, entry_id) = Self::parse_handle(&reservation.handle)?;
        let mut conn = self.conn();

        let acked: usize = redis::cmd("XACK")
            .arg(stream_key)
            .arg(&self.group)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;
        if acked == 0 {
            return Err(BackendError::JobAlreadyAcked(reservation.job.id));
        }
        let _: () = redis::cmd("XDEL")
            .arg(stream_key)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;

        // Re-add with the retry counter unchanged
        self.add_entry(reservation.queue(), &reservation.job).await?;
        Ok(())
    }

    async fn extend_reservation(
        &self,
        reservation: &Reservation,
        _deadline: DateTime<Utc>,
    ) -> BackendResult<()> {
        let (stream_key, entry_id) = Self::parse_handle(&reservation.handle)?;
        let mut conn = self.conn();

        // XCLAIM with idle reset keeps the entry out of XAUTOCLAIM's reach
        let claimed: Vec<String> = redis::cmd("XCLAIM")
            .arg(stream_key)
            .arg(&self.group)
            .arg(&reservation.consumer_id)
            .arg(0)
            .arg(entry_id)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        if claimed.is_empty() {
            return Err(BackendError::JobNotFound(reservation.job.id));
        }
        Ok(())
    }

    async fn peek(&self, queue: &str, offset: usize) -> BackendResult<Option<Job>> {
        let mut conn = self.conn();
        let mut offset = offset;

        for priority in Priority::DESCENDING {
            let key = self.keys.stream(queue, priority);
            let len: usize = redis::cmd("XLEN").arg(&key).query_async(&mut conn).await?;
            if offset < len {
                let entries: Vec<(String, HashMap<String, String>)> = redis::cmd("XRANGE")
                    .arg(&key)
                    .arg("-")
                    .arg("+")
                    .arg("COUNT")
                    .arg(offset + 1)
                    .query_async(&mut conn)
                    .await?;
                let Some((_, fields)) = entries.into_iter().nth(offset) else {
                    return Ok(None);
                };
                return match fields.get("job") {
                    Some(body) => Ok(Some(serde_json::from_str(body)?)),
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
            pipe.cmd("XLEN").arg(self.keys.stream(queue, priority));
        }
        let lens: Vec<usize> = pipe.query_async(&mut conn).await?;
        Ok(lens.iter().sum())
    }

    async fn move_job(&self, reservation: &Reservation, target_queue: &str) -> BackendResult<()> {
        let (stream_key, entry_id) = Self::parse_handle(&reservation.handle)?;
        let mut conn = self.conn();

        // Best effort: the entry may already be acked by a nack(false)
        let _: usize = redis::cmd("XACK")
            .arg(stream_key)
            .arg(&self.group)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;
        let _: () = redis::cmd("XDEL")
            .arg(stream_key)
            .arg(entry_id)
            .query_async(&mut conn)
            .await?;

        let mut moved = reservation.job.clone();
        moved.queue = target_queue.to_string();
        self.add_entry(target_queue, &moved).await?;

        let _: () = redis::cmd("SADD")
            .arg(self.keys.queues())
            .arg(target_queue)
            .query_async(&mut conn)
            .await?;

        debug!(job_id = %moved.id, from = %reservation.queue(), to = %target_queue, "Moved job");
        Ok(())
    }

    async fn iter(
        &self,
        queue: &str,
        opts: IterOptions,
    ) -> BackendResult<BoxStream<'static, BackendResult<Job>>> {
        let mut conn = self.conn();

        let priorities: Vec<Priority> = match opts.order {
            IterOrder::OldestFirst => Priority::DESCENDING.to_vec(),
            IterOrder::NewestFirst => {
                let mut p = Priority::DESCENDING.to_vec();
                p.reverse();
                p
            }
        };
        let stream_keys: Vec<String> = priorities
            .iter()
            .map(|p| self.keys.stream(queue, *p))
            .collect();
        let order = opts.order;

        let stream = try_stream! {
            let mut yielded = 0usize;

            'outer: for key in stream_keys {
                let mut cursor = match order {
                    IterOrder::OldestFirst => "-".to_string(),
                    IterOrder::NewestFirst => "+".to_string(),
                };

                loop {
                    let entries: Vec<(String, HashMap<String, String>)> = match order {
                        IterOrder::OldestFirst => redis::cmd("XRANGE")
                            .arg(&key)
                            .arg(&cursor)
                            .arg("+")
                            .arg("COUNT")
                            .arg(ITER_PAGE)
                            .query_async(&mut conn)
                            .await
                            .map_err(BackendError::Redis)?,
                        IterOrder::NewestFirst => redis::cmd("XREVRANGE")
                            .arg(&key)
                            .arg(&cursor)
                            .arg("-")
                            .arg("COUNT")
                            .arg(ITER_PAGE)
                            .query_async(&mut conn)
                            .await
                            .map_err(BackendError::Redis)?,
                    };

                    if entries.is_empty() {
                        break;
                    }

                    let mut last_id = String::new();
                    for (entry_id, fields) in &entries {
                        last_id = entry_id.clone();
                        let Some(body) = fields.get("job") else { continue };
                        let job: Job = serde_json::from_str(body)
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

                    if entries.len() < ITER_PAGE {
                        break;
                    }
                    // Exclusive cursor resumes after the last seen entry
                    cursor = format!("({}", last_id);
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn reclaim_expired(&self, queue: &str) -> BackendResult<usize> {
        let mut total = self.promote_delayed(queue).await?;
        let config = self.config_or_default(queue).await;
        let idle_ms = config.visibility_timeout.as_millis() as u64;
        let mut conn = self.conn();

        for priority in Priority::DESCENDING {
            let key = self.keys.stream(queue, priority);
            let mut cursor = "0-0".to_string();

            loop {
                let result: redis::Value = redis::cmd("XAUTOCLAIM")
                    .arg(&key)
                    .arg(&self.group)
                    .arg("reaper")
                    .arg(idle_ms)
                    .arg(&cursor)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await
                    .unwrap_or(redis::Value::Nil);

                let redis::Value::Array(parts) = result else { break };
                if parts.len() < 2 {
                    break;
                }

                let next_cursor = match &parts[0] {
                    redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
                    redis::Value::SimpleString(s) => s.clone(),
                    _ => break,
                };

                let redis::Value::Array(entries) = &parts[1] else { break };
                for entry in entries {
                    let redis::Value::Array(pair) = entry else { continue };
                    if pair.len() < 2 {
                        continue;
                    }
                    let entry_id = match &pair[0] {
                        redis::Value::BulkString(bytes) => {
                            String::from_utf8_lossy(bytes).to_string()
                        }
                        redis::Value::SimpleString(s) => s.clone(),
                        _ => continue,
                    };
                    let body = extract_job_field(&pair[1]);

                    // Re-deliver with retry_count incremented
                    let _: usize = redis::cmd("XACK")
                        .arg(&key)
                        .arg(&self.group)
                        .arg(&entry_id)
                        .query_async(&mut conn)
                        .await?;
                    let _: () = redis::cmd("XDEL")
                        .arg(&key)
                        .arg(&entry_id)
                        .query_async(&mut conn)
                        .await?;

                    if let Some(body) = body {
                        if let Ok(job) = serde_json::from_str::<Job>(&body) {
                            self.add_entry(queue, &job.with_retry()).await?;
                            total += 1;
                        }
                    }
                }

                if next_cursor == "0-0" || entries.is_empty() {
                    break;
                }
                cursor = next_cursor;
            }
        }

        if total > 0 {
            warn!(queue = %queue, count = total, "Reclaimed expired stream entries");
        }
        Ok(total)
    }

    async fn health_check(&self) -> BackendResult<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Pull the `job` field out of an XAUTOCLAIM entry's field array.
fn extract_job_field(value: &redis::Value) -> Option<String> {
    let redis::Value::Array(fields) = value else {
        return None;
    };
    let mut iter = fields.iter();
    while let (Some(name), Some(val)) = (iter.next(), iter.next()) {
        let name = match name {
            redis::Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
            redis::Value::SimpleString(s) => s.clone(),
            _ => continue,
        };
        if name == "job" {
            return match val {
                redis::Value::BulkString(bytes) => {
                    Some(String::from_utf8_lossy(bytes).to_string())
                }
                redis::Value::SimpleString(s) => Some(s.clone()),
                _ => None,
            };
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_scheme() {
        let keys = StreamKeys::new("sq");
        assert_eq!(
            keys.stream("emails", Priority::Critical),
            "sq:queue:emails:stream:critical"
        );
        assert_eq!(keys.delayed("emails"), "sq:queue:emails:delayed");
        assert_eq!(keys.queues(), "sq:queues");
    }

    #[test]
    fn test_handle_round_trip() {
        let handle = format!("sq:queue:q:stream:high{}1718000000-0", HANDLE_SEPARATOR);
        let (key, id) = StreamBackend::parse_handle(&handle).unwrap();
        assert_eq!(key, "sq:queue:q:stream:high");
        assert_eq!(id, "1718000000-0");
    }

    #[test]
    fn test_malformed_handle() {
        assert!(StreamBackend::parse_handle("no-separator").is_err());
    }

    #[test]
    fn test_extract_job_field() {
        let value = redis::Value::Array(vec![
            redis::Value::BulkString(b"job".to_vec()),
            redis::Value::BulkString(b"{\"id\":1}".to_vec()),
        ]);
        assert_eq!(extract_job_field(&value), Some("{\"id\":1}".to_string()));

        let missing = redis::Value::Array(vec![
            redis::Value::BulkString(b"other".to_vec()),
            redis::Value::BulkString(b"x".to_vec()),
        ]);
        assert_eq!(extract_job_field(&missing), None);
    }
}
