//! Policy management and pre-rollout simulation.
//!
//! The simulator predicts the impact of a policy change on latency, backlog,
//! and error budget from a (policy, traffic pattern) pair - without touching
//! production state. The rollout manager owns the staged
//! `proposed -> approved -> applied -> rolled_back` lifecycle with an audit
//! trail, and the store publishes the current policy version so the worker,
//! rate limiter, and retry subsystems observe changes at their next decision
//! boundary.

pub mod error;
pub mod model;
pub mod presets;
pub mod rollout;
pub mod simulator;
pub mod store;
pub mod traffic;

pub use error::{PolicyError, PolicyResult};
pub use model::{BackoffStrategy, Policy, RetrySpec};
pub use presets::{policy_preset, traffic_preset, POLICY_PRESETS, TRAFFIC_PRESETS};
pub use rollout::{AuditEntry, ChangeStatus, PolicyChange, PolicyChangeManager};
pub use simulator::{
    SimulationStore, Simulation, SimulationMetrics, SimulationStatus, Simulator, SimulatorConfig,
    Snapshot,
};
pub use store::PolicyStore;
pub use traffic::{PatternKind, TrafficPattern, Variation};
