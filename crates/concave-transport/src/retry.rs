//! Generic exponential-backoff retry, usable against any transport error
//! rather than tied to one wire protocol.

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }
}

/// Retries `operation` while it returns an error for which `should_retry`
/// is true, up to `config.max_retries` additional attempts.
pub async fn retry<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_retries && err.is_recoverable() => {
                let delay = config.calculate_delay(attempt);
                tracing::debug!(attempt, ?delay, error = %err, "retrying transport operation");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Convenience wrapper using the default retry configuration.
pub async fn network_retry<T, F, Fut>(operation: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    retry(&RetryConfig::default(), operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_caps_at_max() {
        let config = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(4000),
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.calculate_delay(0), Duration::from_millis(1000));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(2000));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(4000));
        assert_eq!(config.calculate_delay(5), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn retries_recoverable_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig { initial_delay: Duration::from_millis(1), ..Default::default() };

        let result = retry(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TransportError::Network("boom".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_recoverable_errors() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig { initial_delay: Duration::from_millis(1), ..Default::default() };

        let result: Result<(), _> = retry(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(TransportError::Http {
                    status: 400,
                    code: None,
                    message: "bad request".into(),
                    details: None,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
