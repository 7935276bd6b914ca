use crate::{env_parse_or, env_required, ConfigError, FromEnv};

/// PostgreSQL connection configuration (used by the outbox)
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

impl FromEnv for DatabaseConfig {
    /// Requires DATABASE_URL; DATABASE_MAX_CONNECTIONS defaults to 10
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("DATABASE_URL")?,
            max_connections: env_parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_from_env() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/conveyor")),
                ("DATABASE_MAX_CONNECTIONS", Some("25")),
            ],
            || {
                let config = DatabaseConfig::from_env().unwrap();
                assert_eq!(config.url, "postgres://localhost/conveyor");
                assert_eq!(config.max_connections, 25);
            },
        );
    }

    #[test]
    fn test_database_config_default_pool_size() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("postgres://localhost/conveyor")),
                ("DATABASE_MAX_CONNECTIONS", None),
            ],
            || {
                let config = DatabaseConfig::from_env().unwrap();
                assert_eq!(config.max_connections, 10);
            },
        );
    }

    #[test]
    fn test_database_config_missing_url() {
        temp_env::with_var_unset("DATABASE_URL", || {
            assert!(DatabaseConfig::from_env().is_err());
        });
    }
}
