//! Dedup key reservation.
//!
//! A dedup entry is a (namespace, key, status, ttl) record. Reserving a new
//! key is a single atomic check-and-set; within the TTL, further reservations
//! report `Duplicate`. `confirm` resets the TTL to extend protection through
//! processing (idempotent); `release` early-expires so a legitimate retry can
//! proceed after a terminal failure.

use crate::error::{DeliveryError, DeliveryResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of a dedup reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// The key was not present; it is now reserved.
    New,
    /// The key is live; the caller must suppress its enqueue.
    Duplicate,
}

/// Atomic check-and-set store for dedup entries.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Reserve `key` for `ttl`. Returns `New` exactly once per TTL window.
    async fn reserve(
        &self,
        namespace: &str,
        key: &str,
        ttl: Duration,
    ) -> DeliveryResult<DedupOutcome>;

    /// Mark the entry confirmed and reset its TTL. Idempotent; confirming an
    /// absent key recreates it.
    async fn confirm(&self, namespace: &str, key: &str, ttl: Duration) -> DeliveryResult<()>;

    /// Administrative early expiry.
    async fn release(&self, namespace: &str, key: &str) -> DeliveryResult<()>;
}

fn entry_key(namespace: &str, key: &str) -> String {
    format!("dedup:{}:{}", namespace, key)
}

/// Redis-backed dedup store (`SET NX EX` / `SET EX` / `DEL`).
pub struct RedisDedupStore {
    redis: ConnectionManager,
}

impl RedisDedupStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn reserve(
        &self,
        namespace: &str,
        key: &str,
        ttl: Duration,
    ) -> DeliveryResult<DedupOutcome> {
        let mut conn = self.redis.clone();
        let created: Option<String> = redis::cmd("SET")
            .arg(entry_key(namespace, key))
            .arg("reserved")
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        let outcome = if created.is_some() {
            DedupOutcome::New
        } else {
            DedupOutcome::Duplicate
        };
        debug!(namespace = %namespace, key = %key, outcome = ?outcome, "Dedup reservation");
        Ok(outcome)
    }

    async fn confirm(&self, namespace: &str, key: &str, ttl: Duration) -> DeliveryResult<()> {
        let mut conn = self.redis.clone();
        let _: () = redis::cmd("SET")
            .arg(entry_key(namespace, key))
            .arg("confirmed")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, namespace: &str, key: &str) -> DeliveryResult<()> {
        let mut conn = self.redis.clone();
        let _: () = redis::cmd("DEL")
            .arg(entry_key(namespace, key))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// In-process dedup store for tests and local development.
///
/// Expiry uses `tokio::time::Instant`, so paused-clock tests observe exact
/// TTL behavior.
#[derive(Default)]
pub struct MemoryDedupStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep(entries: &mut HashMap<String, Instant>) {
        let now = Instant::now();
        entries.retain(|_, expires_at| *expires_at > now);
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn reserve(
        &self,
        namespace: &str,
        key: &str,
        ttl: Duration,
    ) -> DeliveryResult<DedupOutcome> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DeliveryError::Dedup("poisoned lock".to_string()))?;
        Self::sweep(&mut entries);

        let full_key = entry_key(namespace, key);
        if entries.contains_key(&full_key) {
            return Ok(DedupOutcome::Duplicate);
        }
        entries.insert(full_key, Instant::now() + ttl);
        Ok(DedupOutcome::New)
    }

    async fn confirm(&self, namespace: &str, key: &str, ttl: Duration) -> DeliveryResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DeliveryError::Dedup("poisoned lock".to_string()))?;
        entries.insert(entry_key(namespace, key), Instant::now() + ttl);
        Ok(())
    }

    async fn release(&self, namespace: &str, key: &str) -> DeliveryResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DeliveryError::Dedup("poisoned lock".to_string()))?;
        entries.remove(&entry_key(namespace, key));
        Ok(())
    }
}
