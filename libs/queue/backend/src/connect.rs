//! Redis connection bootstrap with retry.

use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Retry settings for connection bootstrap.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// Connect to Redis and return a ConnectionManager.
///
/// The ConnectionManager automatically handles reconnections after transient
/// failures. Liveness is verified with a PING before returning.
pub async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    info!("Connecting to Redis at {}", url);

    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;

    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Connected to Redis");
    Ok(manager)
}

/// Connect to Redis, retrying transient failures with exponential backoff.
///
/// # Example
/// ```ignore
/// use queue_backend::{connect_with_retry, RetryConfig};
///
/// let conn = connect_with_retry("redis://127.0.0.1:6379", None).await?;
///
/// let config = RetryConfig::new().with_max_retries(5);
/// let conn = connect_with_retry("redis://127.0.0.1:6379", Some(config)).await?;
/// ```
pub async fn connect_with_retry(
    url: &str,
    retry_config: Option<RetryConfig>,
) -> redis::RedisResult<ConnectionManager> {
    let config = retry_config.unwrap_or_default();
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        match connect(url).await {
            Ok(manager) => return Ok(manager),
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                warn!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Redis connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(config.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_retries(5)
            .with_initial_delay(Duration::from_millis(250));

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        // Nothing listens on this port; all attempts must fail fast.
        let config = RetryConfig::new()
            .with_max_retries(1)
            .with_initial_delay(Duration::from_millis(10));

        let result = connect_with_retry("redis://127.0.0.1:1", Some(config)).await;
        assert!(result.is_err());
    }
}
