//! Jittered backoff for reservation-path failures.
//!
//! Handler failures use the queue's configured backoff curve (applied by the
//! backend on nack). This module only covers infrastructure retries - a
//! failed reserve or heartbeat backs off with jitter and never counts
//! against a job.

use rand::RngExt;
use std::time::Duration;

/// Apply ±25% jitter to a delay.
pub fn jittered(delay: Duration) -> Duration {
    let millis = delay.as_millis() as f64;
    let jitter = millis / 4.0;
    let offset = rand::rng().random_range(-jitter..=jitter);
    Duration::from_millis((millis + offset).max(0.0) as u64)
}

/// Exponential backoff with cap and jitter for consecutive failures.
pub fn backoff_for_attempt(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    jittered(exp.min(max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_in_band() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let delayed = jittered(base);
            assert!(delayed >= Duration::from_millis(750));
            assert!(delayed <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(2);

        // Jitter band around 100ms, 200ms, 400ms
        assert!(backoff_for_attempt(0, base, max) <= Duration::from_millis(125));
        assert!(backoff_for_attempt(1, base, max) >= Duration::from_millis(150));
        assert!(backoff_for_attempt(2, base, max) >= Duration::from_millis(300));

        // Far attempts cap at max (+25%)
        assert!(backoff_for_attempt(30, base, max) <= Duration::from_millis(2500));
    }

    #[test]
    fn test_zero_delay() {
        assert_eq!(jittered(Duration::ZERO), Duration::ZERO);
    }
}
