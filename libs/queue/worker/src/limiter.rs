//! Token-bucket admission control.
//!
//! One bucket per queue gates dequeue: capacity `burst`, continuous refill at
//! `rate_per_second`. `acquire` blocks until the bucket can grant and never
//! over-grants; in any window W the tokens granted are bounded by
//! `burst + rate_per_second * W`.
//!
//! Buckets are owned by the dequeuing process. An operator needing a strict
//! global rate can substitute a store-backed implementation with the same
//! contract.

use queue_backend::RateLimitSpec;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single token bucket.
pub struct TokenBucket {
    rate_per_second: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        Self {
            rate_per_second,
            burst: burst as f64,
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(state: &mut BucketState, rate: f64, burst: f64, now: Instant) {
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(burst);
        state.last_refill = now;
    }

    /// Take `n` tokens if available right now.
    pub fn try_acquire(&self, n: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        Self::refill(&mut state, self.rate_per_second, self.burst, Instant::now());

        if state.tokens >= n as f64 {
            state.tokens -= n as f64;
            true
        } else {
            false
        }
    }

    /// Wait until `n` tokens are available, then take them.
    ///
    /// Callers cancel by dropping the future (e.g. inside `select!` with a
    /// shutdown signal); no tokens are consumed in that case.
    pub async fn acquire(&self, n: u32) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                Self::refill(&mut state, self.rate_per_second, self.burst, Instant::now());

                if state.tokens >= n as f64 {
                    state.tokens -= n as f64;
                    return;
                }
                // Sleep exactly until the deficit refills
                let deficit = n as f64 - state.tokens;
                Duration::from_secs_f64(deficit / self.rate_per_second)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Currently available tokens (after refill).
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        Self::refill(&mut state, self.rate_per_second, self.burst, Instant::now());
        state.tokens
    }
}

/// Per-queue buckets, rebuilt when a queue's rate spec changes.
#[derive(Default)]
pub struct RateLimiterSet {
    buckets: Mutex<HashMap<String, (RateLimitSpec, std::sync::Arc<TokenBucket>)>>,
}

impl RateLimiterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bucket for a queue, or None when rate limiting is disabled.
    ///
    /// A changed spec replaces the bucket at the next decision boundary.
    pub fn bucket(&self, queue: &str, spec: &RateLimitSpec) -> Option<std::sync::Arc<TokenBucket>> {
        if !spec.enabled {
            return None;
        }

        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get(queue) {
            Some((current, bucket)) if current == spec => Some(bucket.clone()),
            _ => {
                debug!(
                    queue = %queue,
                    rate_per_second = spec.rate_per_second,
                    burst = spec.burst,
                    "Building token bucket"
                );
                let bucket =
                    std::sync::Arc::new(TokenBucket::new(spec.rate_per_second, spec.burst));
                buckets.insert(queue.to_string(), (spec.clone(), bucket.clone()));
                Some(bucket)
            }
        }
    }
}
