use policy_sim::{PolicyChangeManager, PolicyStore, SimulationStore};
use std::sync::Arc;

/// Shared state of the admin API.
#[derive(Clone)]
pub struct AppState {
    pub simulations: Arc<SimulationStore>,
    pub changes: Arc<PolicyChangeManager>,
}

impl AppState {
    pub fn new() -> Self {
        let store = Arc::new(PolicyStore::new());
        Self {
            simulations: Arc::new(SimulationStore::new()),
            changes: Arc::new(PolicyChangeManager::new(store)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
