//! Versioned policy store with live publication.
//!
//! Each queue carries a linear chain of policy versions. Publishing a new
//! version makes it current and notifies subscribers through a watch
//! channel; the worker, rate limiter, and retry subsystems read the watched
//! value at their next decision boundary.

use crate::error::{PolicyError, PolicyResult};
use crate::model::Policy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::info;

struct QueuePolicies {
    /// Linear history; the last element is current
    versions: Vec<Arc<Policy>>,
    publisher: watch::Sender<Arc<Policy>>,
}

/// Policy storage and publication for all queues.
#[derive(Default)]
pub struct PolicyStore {
    queues: Mutex<HashMap<String, QueuePolicies>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a policy as the current version for its queue.
    /// Returns the assigned version number (starting at 1).
    pub fn publish(&self, mut policy: Policy) -> PolicyResult<u64> {
        policy.validate()?;

        let mut queues = self.queues.lock().unwrap();
        let queue = policy.queue.clone();

        match queues.get_mut(&queue) {
            Some(entry) => {
                policy.version = entry.versions.last().map(|p| p.version).unwrap_or(0) + 1;
                let shared = Arc::new(policy);
                entry.versions.push(shared.clone());
                let _ = entry.publisher.send(shared.clone());
                info!(queue = %queue, version = shared.version, "Published policy version");
                Ok(shared.version)
            }
            None => {
                policy.version = 1;
                let shared = Arc::new(policy);
                let (publisher, _) = watch::channel(shared.clone());
                queues.insert(
                    queue.clone(),
                    QueuePolicies {
                        versions: vec![shared],
                        publisher,
                    },
                );
                info!(queue = %queue, version = 1, "Published initial policy");
                Ok(1)
            }
        }
    }

    /// The current policy of a queue.
    pub fn current(&self, queue: &str) -> PolicyResult<Arc<Policy>> {
        let queues = self.queues.lock().unwrap();
        queues
            .get(queue)
            .and_then(|entry| entry.versions.last().cloned())
            .ok_or_else(|| PolicyError::PolicyNotFound(queue.to_string()))
    }

    /// A specific retained version.
    pub fn version(&self, queue: &str, version: u64) -> PolicyResult<Arc<Policy>> {
        let queues = self.queues.lock().unwrap();
        queues
            .get(queue)
            .and_then(|entry| entry.versions.iter().find(|p| p.version == version).cloned())
            .ok_or(PolicyError::VersionNotFound {
                queue: queue.to_string(),
                version,
            })
    }

    /// All retained versions of a queue, oldest first.
    pub fn history(&self, queue: &str) -> Vec<Arc<Policy>> {
        let queues = self.queues.lock().unwrap();
        queues
            .get(queue)
            .map(|entry| entry.versions.clone())
            .unwrap_or_default()
    }

    /// Subscribe to the current policy of a queue. The receiver yields the
    /// current value immediately and every later publish.
    pub fn subscribe(&self, queue: &str) -> PolicyResult<watch::Receiver<Arc<Policy>>> {
        let queues = self.queues.lock().unwrap();
        queues
            .get(queue)
            .map(|entry| entry.publisher.subscribe())
            .ok_or_else(|| PolicyError::PolicyNotFound(queue.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_assigns_versions() {
        let store = PolicyStore::new();
        assert_eq!(store.publish(Policy::new("q")).unwrap(), 1);
        assert_eq!(store.publish(Policy::new("q")).unwrap(), 2);
        assert_eq!(store.current("q").unwrap().version, 2);
        assert_eq!(store.history("q").len(), 2);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let store = PolicyStore::new();
        let mut policy = Policy::new("q");
        policy.max_concurrency = 0;
        assert!(store.publish(policy).is_err());
    }

    #[test]
    fn test_version_lookup() {
        let store = PolicyStore::new();
        store.publish(Policy::new("q").with_concurrency(2)).unwrap();
        store.publish(Policy::new("q").with_concurrency(8)).unwrap();

        assert_eq!(store.version("q", 1).unwrap().max_concurrency, 2);
        assert_eq!(store.version("q", 2).unwrap().max_concurrency, 8);
        assert!(store.version("q", 3).is_err());
    }

    #[tokio::test]
    async fn test_subscribers_observe_publishes() {
        let store = PolicyStore::new();
        store.publish(Policy::new("q").with_concurrency(2)).unwrap();

        let mut rx = store.subscribe("q").unwrap();
        assert_eq!(rx.borrow().max_concurrency, 2);

        store.publish(Policy::new("q").with_concurrency(16)).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().max_concurrency, 16);
    }

    #[test]
    fn test_missing_queue() {
        let store = PolicyStore::new();
        assert!(store.current("missing").is_err());
        assert!(store.subscribe("missing").is_err());
        assert!(store.history("missing").is_empty());
    }
}
