//! Error types for migrations.

use thiserror::Error;

pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("a migration is already active for queue '{0}'")]
    AlreadyInProgress(String),

    #[error("migration failed during {phase}: {reason}")]
    Failed { phase: &'static str, reason: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("migration cancelled by operator")]
    Cancelled,

    #[error(transparent)]
    Backend(#[from] queue_backend::BackendError),
}

impl MigrationError {
    /// Stable machine-readable code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInProgress(_) => "MIGRATION_IN_PROGRESS",
            Self::Failed { .. } | Self::Cancelled => "MIGRATION_FAILED",
            Self::Validation(_) => "INVALID_CONFIGURATION",
            Self::Backend(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            MigrationError::AlreadyInProgress("q".into()).code(),
            "MIGRATION_IN_PROGRESS"
        );
        assert_eq!(MigrationError::Cancelled.code(), "MIGRATION_FAILED");
        assert_eq!(
            MigrationError::Validation("no target".into()).code(),
            "INVALID_CONFIGURATION"
        );
    }
}
