use crate::{env_or_default, env_parse_or, ConfigError, FromEnv};

/// HTTP server bind configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromEnv for ServerConfig {
    /// HOST defaults to 0.0.0.0, PORT defaults to 8080
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8080)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        temp_env::with_vars([("HOST", None::<&str>), ("PORT", None)], || {
            let config = ServerConfig::from_env().unwrap();
            assert_eq!(config.host, "0.0.0.0");
            assert_eq!(config.port, 8080);
            assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        });
    }

    #[test]
    fn test_server_config_from_env() {
        temp_env::with_vars([("HOST", Some("127.0.0.1")), ("PORT", Some("9090"))], || {
            let config = ServerConfig::from_env().unwrap();
            assert_eq!(config.bind_addr(), "127.0.0.1:9090");
        });
    }

    #[test]
    fn test_server_config_invalid_port() {
        temp_env::with_var("PORT", Some("not-a-port"), || {
            assert!(ServerConfig::from_env().is_err());
        });
    }
}
