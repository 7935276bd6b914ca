//! Producer routing.
//!
//! Producers consult the router at each enqueue decision; flipping a route
//! is how draining stops new writes from reaching the source backend. Routes
//! are published through a watch channel so producers in other tasks observe
//! the flip without polling shared locks.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::info;

/// Maps queue names to backend names; unrouted queues use the default.
pub struct ProducerRouter {
    default_backend: String,
    routes: Mutex<HashMap<String, String>>,
    publisher: watch::Sender<HashMap<String, String>>,
}

impl ProducerRouter {
    pub fn new(default_backend: impl Into<String>) -> Self {
        let (publisher, _) = watch::channel(HashMap::new());
        Self {
            default_backend: default_backend.into(),
            routes: Mutex::new(HashMap::new()),
            publisher,
        }
    }

    /// Backend name producers should enqueue to for this queue.
    pub fn route(&self, queue: &str) -> String {
        self.routes
            .lock()
            .unwrap()
            .get(queue)
            .cloned()
            .unwrap_or_else(|| self.default_backend.clone())
    }

    /// Point a queue's producers at a backend.
    pub fn set_route(&self, queue: &str, backend: &str) {
        let mut routes = self.routes.lock().unwrap();
        routes.insert(queue.to_string(), backend.to_string());
        let _ = self.publisher.send(routes.clone());
        info!(queue = %queue, backend = %backend, "Producer route updated");
    }

    /// Remove an explicit route, restoring the default.
    pub fn clear_route(&self, queue: &str) {
        let mut routes = self.routes.lock().unwrap();
        routes.remove(queue);
        let _ = self.publisher.send(routes.clone());
    }

    /// Observe route changes without polling.
    pub fn subscribe(&self) -> watch::Receiver<HashMap<String, String>> {
        self.publisher.subscribe()
    }
}
