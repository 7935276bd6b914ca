//! Error types for policy management.

use crate::rollout::ChangeStatus;
use thiserror::Error;
use uuid::Uuid;

pub type PolicyResult<T> = Result<T, PolicyError>;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no policy published for queue '{0}'")]
    PolicyNotFound(String),

    #[error("policy version {version} not found for queue '{queue}'")]
    VersionNotFound { queue: String, version: u64 },

    #[error("policy change '{0}' not found")]
    ChangeNotFound(Uuid),

    #[error("simulation '{0}' not found")]
    SimulationNotFound(Uuid),

    #[error("change '{id}' is {actual:?}; this transition requires {required:?}")]
    InvalidTransition {
        id: Uuid,
        actual: ChangeStatus,
        required: ChangeStatus,
    },

    #[error("change '{0}' has no attached simulations")]
    NoSimulations(Uuid),
}

impl PolicyError {
    /// Stable machine-readable code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::PolicyNotFound(_) | Self::VersionNotFound { .. } => "QUEUE_NOT_FOUND",
            Self::ChangeNotFound(_) | Self::SimulationNotFound(_) => "JOB_NOT_FOUND",
            Self::InvalidTransition { .. } | Self::NoSimulations(_) => "INVALID_CONFIGURATION",
        }
    }
}
