//! Circuit breaking per (queue, job type).
//!
//! ```text
//! ┌─────────┐ failures >= threshold  ┌────────┐
//! │ CLOSED  │ ─────within window───> │  OPEN  │
//! └─────────┘                        └────────┘
//!      ^                                  │
//!      │ successes >= recovery            │ timeout elapsed
//!      │                                  v
//!      │                          ┌─────────────┐
//!      └───────────────────────── │  HALF-OPEN  │ ──any failure──> OPEN
//!                                 └─────────────┘
//! ```
//!
//! An open breaker makes the worker skip reserving that class; reserved jobs
//! are never acked or dead-lettered because a breaker is open.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected immediately.
    Open,
    /// Probing whether the class has recovered.
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(&self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::HalfOpen => 1,
            Self::Open => 2,
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within `window` before opening the circuit
    pub failure_threshold: u32,
    /// Successes in half-open before closing
    pub recovery_threshold: u32,
    /// How long to stay open before allowing a probe
    pub timeout: Duration,
    /// Rolling window for the failure count
    pub window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_threshold: 2,
            timeout: Duration::from_secs(30),
            window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_threshold(mut self, threshold: u32) -> Self {
        self.recovery_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

struct BreakerState {
    state: CircuitState,
    /// Failure timestamps inside the rolling window
    failures: VecDeque<Instant>,
    successes: u32,
    opened_at: Option<Instant>,
}

/// Thread-safe circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Whether a reservation of this class may proceed.
    ///
    /// An open breaker transitions to half-open once its timeout elapses,
    /// letting a probe through.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    info!("Circuit breaker HALF-OPEN (probing recovery)");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failures.clear();
            }
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.recovery_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures.clear();
                    inner.opened_at = None;
                    info!("Circuit breaker CLOSED (recovered)");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => {
                inner.failures.push_back(now);
                // Drop failures that fell out of the rolling window
                while let Some(oldest) = inner.failures.front() {
                    if now.duration_since(*oldest) > self.config.window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    warn!("Circuit breaker OPENED");
                }
            }
            CircuitState::HalfOpen => {
                // Any failure during probing reopens and restarts the timer
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.successes = 0;
                warn!("Circuit breaker RE-OPENED (probe failed)");
            }
            CircuitState::Open => {}
        }
    }
}

/// Breakers keyed by (queue, job type).
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<(String, String), Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, queue: &str, job_type: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry((queue.to_string(), job_type.to_string()))
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.clone())))
            .clone()
    }

    /// Whether the worker may reserve from this queue at all: true unless
    /// some class of the queue has an open breaker and no class is closed.
    ///
    /// With a single job type per queue this is exactly "skip while open";
    /// with mixed types the queue stays eligible as long as any class still
    /// accepts work.
    pub fn queue_allowed(&self, queue: &str) -> bool {
        let breakers = self.breakers.lock().unwrap();
        let mut any_open = false;
        let mut any_allowed = false;
        let mut seen = false;

        for ((q, job_type), breaker) in breakers.iter() {
            if q != queue {
                continue;
            }
            seen = true;
            if breaker.allow() {
                any_allowed = true;
            } else {
                any_open = true;
            }
            observability::queue::set_breaker_state(q, job_type, breaker.state().as_gauge());
        }

        !seen || any_allowed || !any_open
    }

    /// Report a handler outcome for a class.
    pub fn record(&self, queue: &str, job_type: &str, success: bool) {
        let breaker = self.get_or_create(queue, job_type);
        if success {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
        observability::queue::set_breaker_state(queue, job_type, breaker.state().as_gauge());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_recovery_threshold(2)
            .with_timeout(Duration::from_secs(1))
            .with_window(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_allows() {
        let breaker = CircuitBreaker::new(fast_config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(fast_config());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_after_timeout_then_recovery() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(!breaker.allow());

        // During the open window everything is rejected
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(!breaker.allow());

        // After the timeout one probe is allowed
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Two successes close the breaker
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_restarts_timer() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(breaker.allow());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Timer restarted: still open shortly after the probe failure
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!breaker.allow());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(breaker.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_prunes_stale_failures() {
        let config = fast_config().with_window(Duration::from_millis(500));
        let breaker = CircuitBreaker::new(config);

        breaker.record_failure();
        breaker.record_failure();
        tokio::time::sleep(Duration::from_millis(600)).await;

        // The two stale failures no longer count toward the threshold
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_in_closed_clears_failures() {
        let breaker = CircuitBreaker::new(fast_config());
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_queue_gating() {
        let registry = BreakerRegistry::new(fast_config());

        // Unknown queue is allowed
        assert!(registry.queue_allowed("q"));

        // Open the only class of the queue
        for _ in 0..3 {
            registry.record("q", "send_email", false);
        }
        assert!(!registry.queue_allowed("q"));

        // Another queue is unaffected
        assert!(registry.queue_allowed("other"));

        // A second, healthy class keeps the queue eligible
        registry.record("q", "render_pdf", true);
        assert!(registry.queue_allowed("q"));
    }
}
