//! Staged policy rollout with audit.
//!
//! ```text
//! proposed ──approve──> approved ──apply──> applied ──rollback──> rolled_back
//!     │                     │                  │
//!     └──────── fail ───────┴────── fail ──────┘──> failed
//! ```
//!
//! `apply` from any state other than `approved` fails; `rollback` from any
//! state other than `applied` fails. Every transition appends exactly one
//! audit entry with a monotonic timestamp.

use crate::error::{PolicyError, PolicyResult};
use crate::model::Policy;
use crate::store::PolicyStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a policy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Proposed,
    Approved,
    Applied,
    RolledBack,
    Failed,
}

/// One audit line: who moved the change, and when.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub action: String,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// A proposed policy delta linked to its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PolicyChange {
    pub id: Uuid,
    pub queue: String,
    /// The policy to publish when applied
    pub proposed: Policy,
    /// The version that was current before apply (for rollback)
    pub previous: Option<Policy>,
    pub status: ChangeStatus,
    /// Simulations reviewed for this change
    pub simulations: Vec<Uuid>,
    pub audit: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
}

impl PolicyChange {
    fn record(&mut self, action: &str, actor: &str) {
        self.audit.push(AuditEntry {
            action: action.to_string(),
            actor: actor.to_string(),
            at: Utc::now(),
        });
    }
}

/// Owns the staged rollout of policy changes.
pub struct PolicyChangeManager {
    store: Arc<PolicyStore>,
    changes: Mutex<HashMap<Uuid, PolicyChange>>,
}

impl PolicyChangeManager {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self {
            store,
            changes: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<PolicyStore> {
        self.store.clone()
    }

    /// Create a change in `proposed`.
    pub fn propose(&self, proposed: Policy, actor: &str) -> PolicyResult<PolicyChange> {
        proposed.validate()?;

        let mut change = PolicyChange {
            id: Uuid::new_v4(),
            queue: proposed.queue.clone(),
            proposed,
            previous: None,
            status: ChangeStatus::Proposed,
            simulations: Vec::new(),
            audit: Vec::new(),
            created_at: Utc::now(),
        };
        change.record("proposed", actor);

        info!(change_id = %change.id, queue = %change.queue, actor = %actor, "Policy change proposed");
        let snapshot = change.clone();
        self.changes.lock().unwrap().insert(change.id, change);
        Ok(snapshot)
    }

    /// Attach a reviewed simulation to a proposed change.
    pub fn attach_simulation(
        &self,
        change_id: Uuid,
        simulation_id: Uuid,
        actor: &str,
    ) -> PolicyResult<PolicyChange> {
        let mut changes = self.changes.lock().unwrap();
        let change = changes
            .get_mut(&change_id)
            .ok_or(PolicyError::ChangeNotFound(change_id))?;

        if change.status != ChangeStatus::Proposed {
            return Err(PolicyError::InvalidTransition {
                id: change_id,
                actual: change.status,
                required: ChangeStatus::Proposed,
            });
        }

        change.simulations.push(simulation_id);
        change.record("simulation_attached", actor);
        Ok(change.clone())
    }

    /// Move a reviewed change to `approved`. Requires at least one attached
    /// simulation.
    pub fn approve(&self, change_id: Uuid, actor: &str) -> PolicyResult<PolicyChange> {
        let mut changes = self.changes.lock().unwrap();
        let change = changes
            .get_mut(&change_id)
            .ok_or(PolicyError::ChangeNotFound(change_id))?;

        if change.status != ChangeStatus::Proposed {
            return Err(PolicyError::InvalidTransition {
                id: change_id,
                actual: change.status,
                required: ChangeStatus::Proposed,
            });
        }
        if change.simulations.is_empty() {
            return Err(PolicyError::NoSimulations(change_id));
        }

        change.status = ChangeStatus::Approved;
        change.record("approved", actor);
        info!(change_id = %change_id, actor = %actor, "Policy change approved");
        Ok(change.clone())
    }

    /// Publish the proposed policy as current, recording the previous values
    /// for rollback. Only valid from `approved`.
    pub fn apply(&self, change_id: Uuid, actor: &str) -> PolicyResult<PolicyChange> {
        let mut changes = self.changes.lock().unwrap();
        let change = changes
            .get_mut(&change_id)
            .ok_or(PolicyError::ChangeNotFound(change_id))?;

        if change.status != ChangeStatus::Approved {
            return Err(PolicyError::InvalidTransition {
                id: change_id,
                actual: change.status,
                required: ChangeStatus::Approved,
            });
        }

        change.previous = self.store.current(&change.queue).ok().map(|p| (*p).clone());

        match self.store.publish(change.proposed.clone()) {
            Ok(version) => {
                change.proposed.version = version;
                change.status = ChangeStatus::Applied;
                change.record("applied", actor);
                info!(
                    change_id = %change_id,
                    queue = %change.queue,
                    version = version,
                    actor = %actor,
                    "Policy change applied"
                );
                Ok(change.clone())
            }
            Err(e) => {
                change.status = ChangeStatus::Failed;
                change.record("failed", actor);
                Err(e)
            }
        }
    }

    /// Restore the previous values. Only valid from `applied`.
    pub fn rollback(&self, change_id: Uuid, actor: &str) -> PolicyResult<PolicyChange> {
        let mut changes = self.changes.lock().unwrap();
        let change = changes
            .get_mut(&change_id)
            .ok_or(PolicyError::ChangeNotFound(change_id))?;

        if change.status != ChangeStatus::Applied {
            return Err(PolicyError::InvalidTransition {
                id: change_id,
                actual: change.status,
                required: ChangeStatus::Applied,
            });
        }

        if let Some(previous) = change.previous.clone() {
            self.store.publish(previous)?;
        }
        change.status = ChangeStatus::RolledBack;
        change.record("rolled_back", actor);
        info!(change_id = %change_id, queue = %change.queue, actor = %actor, "Policy change rolled back");
        Ok(change.clone())
    }

    pub fn get(&self, change_id: Uuid) -> PolicyResult<PolicyChange> {
        self.changes
            .lock()
            .unwrap()
            .get(&change_id)
            .cloned()
            .ok_or(PolicyError::ChangeNotFound(change_id))
    }

    /// Newest first.
    pub fn list(&self, limit: usize) -> Vec<PolicyChange> {
        let changes = self.changes.lock().unwrap();
        let mut all: Vec<PolicyChange> = changes.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PolicyChangeManager {
        PolicyChangeManager::new(Arc::new(PolicyStore::new()))
    }

    fn approved_change(manager: &PolicyChangeManager) -> PolicyChange {
        let change = manager
            .propose(Policy::new("q").with_concurrency(8), "alice")
            .unwrap();
        manager
            .attach_simulation(change.id, Uuid::new_v4(), "alice")
            .unwrap();
        manager.approve(change.id, "bob").unwrap()
    }

    #[test]
    fn test_full_lifecycle_with_audit() {
        let manager = manager();
        manager
            .store()
            .publish(Policy::new("q").with_concurrency(2))
            .unwrap();

        let change = approved_change(&manager);
        let applied = manager.apply(change.id, "carol").unwrap();
        assert_eq!(applied.status, ChangeStatus::Applied);
        assert_eq!(applied.previous.as_ref().unwrap().max_concurrency, 2);
        assert_eq!(manager.store().current("q").unwrap().max_concurrency, 8);

        let rolled_back = manager.rollback(change.id, "carol").unwrap();
        assert_eq!(rolled_back.status, ChangeStatus::RolledBack);
        assert_eq!(manager.store().current("q").unwrap().max_concurrency, 2);

        // One audit entry per transition, timestamps monotonic
        let actions: Vec<&str> = rolled_back
            .audit
            .iter()
            .map(|entry| entry.action.as_str())
            .collect();
        assert_eq!(
            actions,
            vec![
                "proposed",
                "simulation_attached",
                "approved",
                "applied",
                "rolled_back"
            ]
        );
        for window in rolled_back.audit.windows(2) {
            assert!(window[0].at <= window[1].at);
        }
    }

    #[test]
    fn test_apply_requires_approved() {
        let manager = manager();
        let change = manager.propose(Policy::new("q"), "alice").unwrap();

        let err = manager.apply(change.id, "alice").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidTransition { .. }));

        // Applied changes cannot apply twice
        let change = approved_change(&manager);
        manager.apply(change.id, "alice").unwrap();
        assert!(manager.apply(change.id, "alice").is_err());
    }

    #[test]
    fn test_rollback_requires_applied() {
        let manager = manager();
        let change = approved_change(&manager);
        assert!(manager.rollback(change.id, "alice").is_err());

        manager.apply(change.id, "alice").unwrap();
        manager.rollback(change.id, "alice").unwrap();
        // rolled_back is terminal for rollback
        assert!(manager.rollback(change.id, "alice").is_err());
    }

    #[test]
    fn test_approve_requires_simulations() {
        let manager = manager();
        let change = manager.propose(Policy::new("q"), "alice").unwrap();
        assert!(matches!(
            manager.approve(change.id, "bob").unwrap_err(),
            PolicyError::NoSimulations(_)
        ));
    }

    #[test]
    fn test_rollback_without_previous_keeps_current() {
        // No policy existed before the apply
        let manager = manager();
        let change = approved_change(&manager);
        manager.apply(change.id, "alice").unwrap();
        assert_eq!(manager.store().current("q").unwrap().max_concurrency, 8);

        manager.rollback(change.id, "alice").unwrap();
        // Nothing to restore; the applied version stays current
        assert_eq!(manager.store().current("q").unwrap().max_concurrency, 8);
    }

    #[test]
    fn test_list_newest_first() {
        let manager = manager();
        let first = manager.propose(Policy::new("a"), "alice").unwrap();
        let second = manager.propose(Policy::new("b"), "alice").unwrap();

        let listed = manager.list(10);
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|c| c.id == first.id));
        assert_eq!(manager.list(1).len(), 1);
        let _ = second;
    }
}
