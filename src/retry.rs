use log::{debug, warn};
use rand::random;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{RelayError, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: usize,

    /// Initial delay before first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Multiplier for exponential backoff
    pub backoff_factor: f64,

    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,

    /// Whether to add up to 100ms of jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            backoff_factor: 1.5,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given delay failed again
    fn next_delay(&self, delay: Duration) -> Duration {
        let next_ms = ((delay.as_millis() as f64 * self.backoff_factor) as u64).min(self.max_delay_ms);
        if self.jitter {
            Duration::from_millis(next_ms + random::<u64>() % 100)
        } else {
            Duration::from_millis(next_ms)
        }
    }
}

/// Execute an async operation, retrying with exponential backoff.
///
/// Used by sinks for their own connection handling; the dispatcher itself
/// never retries.
pub async fn execute_with_retry<F, Fut, T, E>(
    operation: F,
    config: RetryConfig,
    context: &str,
) -> Result<T>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<T, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut attempts = 0;
    let mut delay = Duration::from_millis(config.initial_delay_ms);

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempts += 1;

                if attempts >= config.max_attempts {
                    return Err(RelayError::retry(context, attempts, err));
                }

                warn!(
                    "{} (attempt {}/{}): {}",
                    context, attempts, config.max_attempts, err
                );

                sleep(delay).await;
                delay = config.next_delay(delay);

                debug!("Retrying after {:?} delay", delay);
            }
        }
    }
}

/// Builder for custom retry configurations
pub struct RetryBuilder {
    config: RetryConfig,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    pub fn initial_delay(mut self, delay_ms: u64) -> Self {
        self.config.initial_delay_ms = delay_ms;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.config.backoff_factor = factor;
        self
    }

    pub fn max_delay(mut self, delay_ms: u64) -> Self {
        self.config.max_delay_ms = delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
