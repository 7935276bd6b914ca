//! Capability flags advertised by each provider.
//!
//! Higher layers consult these before using optional semantics instead of
//! down-casting to a concrete provider.

use serde::{Deserialize, Serialize};

/// What a backend provider can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Acknowledgement is a single atomic operation on the store
    pub atomic_ack: bool,
    /// Multiple worker pools can share delivery via consumer groups
    pub consumer_groups: bool,
    /// Historical entries can be re-read after delivery
    pub replay: bool,
    /// Enqueueing the same id twice stores one copy
    pub idempotent_enqueue: bool,
    /// Multi-operation transitions are transactional
    pub transactions: bool,
    /// Accepted writes survive a process restart
    pub persistence: bool,
    /// The store can run clustered
    pub clustering: bool,
    /// Entries can carry a time-to-live
    pub ttl: bool,
    /// Delivery respects per-job priority classes
    pub prioritization: bool,
    /// Batched enqueue is a single round trip
    pub batch_ops: bool,
}

impl Capabilities {
    /// Redis list provider: scripted transitions, no groups or replay.
    pub fn list() -> Self {
        Self {
            atomic_ack: true,
            consumer_groups: false,
            replay: false,
            idempotent_enqueue: false,
            transactions: true,
            persistence: true,
            clustering: false,
            ttl: true,
            prioritization: true,
            batch_ops: true,
        }
    }

    /// Redis stream provider: consumer groups, replay, cluster-friendly.
    pub fn stream() -> Self {
        Self {
            atomic_ack: true,
            consumer_groups: true,
            replay: true,
            idempotent_enqueue: false,
            transactions: false,
            persistence: true,
            clustering: true,
            ttl: false,
            prioritization: true,
            batch_ops: true,
        }
    }

    /// In-memory provider: everything except durability.
    pub fn memory() -> Self {
        Self {
            atomic_ack: true,
            consumer_groups: false,
            replay: false,
            idempotent_enqueue: true,
            transactions: true,
            persistence: false,
            clustering: false,
            ttl: true,
            prioritization: true,
            batch_ops: true,
        }
    }

    /// Whether this provider satisfies `required` (every flag set there is
    /// also set here).
    pub fn satisfies(&self, required: &Capabilities) -> bool {
        (!required.atomic_ack || self.atomic_ack)
            && (!required.consumer_groups || self.consumer_groups)
            && (!required.replay || self.replay)
            && (!required.idempotent_enqueue || self.idempotent_enqueue)
            && (!required.transactions || self.transactions)
            && (!required.persistence || self.persistence)
            && (!required.clustering || self.clustering)
            && (!required.ttl || self.ttl)
            && (!required.prioritization || self.prioritization)
            && (!required.batch_ops || self.batch_ops)
    }

    /// A requirement set with nothing required; set flags on it as needed.
    pub fn none() -> Self {
        Self {
            atomic_ack: false,
            consumer_groups: false,
            replay: false,
            idempotent_enqueue: false,
            transactions: false,
            persistence: false,
            clustering: false,
            ttl: false,
            prioritization: false,
            batch_ops: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_profiles() {
        assert!(!Capabilities::list().consumer_groups);
        assert!(!Capabilities::list().replay);
        assert!(Capabilities::stream().consumer_groups);
        assert!(Capabilities::stream().replay);
        assert!(!Capabilities::memory().persistence);
    }

    #[test]
    fn test_satisfies() {
        let mut required = Capabilities::none();
        required.persistence = true;

        assert!(Capabilities::list().satisfies(&required));
        assert!(Capabilities::stream().satisfies(&required));
        assert!(!Capabilities::memory().satisfies(&required));

        required.consumer_groups = true;
        assert!(!Capabilities::list().satisfies(&required));
        assert!(Capabilities::stream().satisfies(&required));
    }

    #[test]
    fn test_satisfies_empty_requirement() {
        let required = Capabilities::none();
        assert!(Capabilities::memory().satisfies(&required));
    }
}
