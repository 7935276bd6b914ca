use crate::{env_or_default, env_parse_or, ConfigError, Environment, FromEnv};

/// Trace export configuration
///
/// The exporter itself lives outside this workspace; these settings are the
/// contract the process exposes to it (endpoint, sampling, environment tag).
#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    /// OTLP collector endpoint; tracing export is disabled when unset
    pub otlp_endpoint: Option<String>,
    /// Head-sampling rate in [0.0, 1.0]
    pub sample_rate: f64,
    /// Environment tag attached to exported telemetry
    pub environment: String,
    /// Log level default when RUST_LOG is unset
    pub log_level: String,
}

impl FromEnv for ObservabilityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let sample_rate: f64 = env_parse_or("OTEL_TRACES_SAMPLER_ARG", 1.0)?;
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(ConfigError::ParseError {
                key: "OTEL_TRACES_SAMPLER_ARG".to_string(),
                details: format!("sample rate {} outside [0.0, 1.0]", sample_rate),
            });
        }

        Ok(Self {
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            sample_rate,
            environment: Environment::from_env().tag().to_string(),
            log_level: env_or_default("LOG_LEVEL", "info"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observability_defaults() {
        temp_env::with_vars(
            [
                ("OTEL_EXPORTER_OTLP_ENDPOINT", None::<&str>),
                ("OTEL_TRACES_SAMPLER_ARG", None),
                ("APP_ENV", None),
                ("LOG_LEVEL", None),
            ],
            || {
                let config = ObservabilityConfig::from_env().unwrap();
                assert!(config.otlp_endpoint.is_none());
                assert_eq!(config.sample_rate, 1.0);
                assert_eq!(config.environment, "development");
                assert_eq!(config.log_level, "info");
            },
        );
    }

    #[test]
    fn test_observability_sample_rate_bounds() {
        temp_env::with_var("OTEL_TRACES_SAMPLER_ARG", Some("1.5"), || {
            assert!(ObservabilityConfig::from_env().is_err());
        });

        temp_env::with_var("OTEL_TRACES_SAMPLER_ARG", Some("0.25"), || {
            let config = ObservabilityConfig::from_env().unwrap();
            assert_eq!(config.sample_rate, 0.25);
        });
    }
}
