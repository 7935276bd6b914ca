//! Named policy and traffic presets for the admin surface.

use crate::model::{BackoffStrategy, Policy, RetrySpec};
use crate::traffic::{PatternKind, TrafficPattern};
use std::time::Duration;

/// Preset names exposed by the API.
pub const POLICY_PRESETS: [&str; 3] = ["conservative", "balanced", "aggressive"];

/// Traffic preset names exposed by the API.
pub const TRAFFIC_PRESETS: [&str; 4] = ["steady", "spike", "seasonal", "bursty"];

/// A named policy preset for a queue, or None for an unknown name.
pub fn policy_preset(name: &str, queue: &str) -> Option<Policy> {
    let policy = match name {
        "conservative" => Policy::new(queue)
            .with_retry(RetrySpec {
                max_retries: 5,
                initial_backoff_ms: 2_000,
                max_backoff_ms: 300_000,
                multiplier: 3.0,
                strategy: BackoffStrategy::Exponential,
            })
            .with_rate(10.0, 5)
            .with_concurrency(2)
            .with_queue_size(50_000)
            .with_processing_timeout(Duration::from_secs(60)),
        "balanced" => Policy::new(queue),
        "aggressive" => Policy::new(queue)
            .with_retry(RetrySpec {
                max_retries: 1,
                initial_backoff_ms: 100,
                max_backoff_ms: 5_000,
                multiplier: 2.0,
                strategy: BackoffStrategy::Exponential,
            })
            .with_rate(1_000.0, 200)
            .with_concurrency(32)
            .with_queue_size(5_000)
            .with_processing_timeout(Duration::from_secs(5)),
        _ => return None,
    };
    Some(policy)
}

/// A named traffic preset, or None for an unknown name.
pub fn traffic_preset(name: &str) -> Option<TrafficPattern> {
    let pattern = match name {
        "steady" => TrafficPattern::new(PatternKind::Constant, 50.0, 3_600.0),
        "spike" => TrafficPattern::new(PatternKind::Spike, 50.0, 3_600.0),
        "seasonal" => TrafficPattern::new(PatternKind::Seasonal, 50.0, 3_600.0),
        "bursty" => TrafficPattern::new(PatternKind::Bursty, 50.0, 3_600.0),
        _ => return None,
    };
    Some(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_policy_presets_are_valid() {
        for name in POLICY_PRESETS {
            let policy = policy_preset(name, "q").expect(name);
            assert!(policy.validate().is_ok(), "{} must validate", name);
        }
        assert!(policy_preset("extreme", "q").is_none());
    }

    #[test]
    fn test_all_traffic_presets_are_valid() {
        for name in TRAFFIC_PRESETS {
            let pattern = traffic_preset(name).expect(name);
            assert!(pattern.validate().is_ok(), "{} must validate", name);
        }
        assert!(traffic_preset("tsunami").is_none());
    }

    #[test]
    fn test_presets_differ() {
        let conservative = policy_preset("conservative", "q").unwrap();
        let aggressive = policy_preset("aggressive", "q").unwrap();
        assert!(conservative.max_concurrency < aggressive.max_concurrency);
        assert!(conservative.retry.max_retries > aggressive.retry.max_retries);
    }
}
