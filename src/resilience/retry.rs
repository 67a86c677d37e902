//! Retry Logic
//!
//! Exponential backoff retry with jitter.

use parking_lot::Mutex;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::telemetry::{NoOpMetrics, SessionMetrics};

/// Decides whether a failed attempt should be retried. Receives the error and
/// the 1-based number of the attempt that failed.
pub type RetryPredicate = Arc<dyn Fn(&SessionError, u32) -> bool + Send + Sync>;

/// Called once per retry, before the backoff sleep.
pub type RetryHook = Arc<dyn Fn(&RetryAttempt<'_>) + Send + Sync>;

/// Details of an upcoming retry.
#[derive(Debug)]
pub struct RetryAttempt<'a> {
    /// Number of the attempt that just failed, starting at 1.
    pub attempt: u32,
    /// Delay before the next attempt.
    pub delay: Duration,
    /// Error that triggered the retry.
    pub error: &'a SessionError,
}

/// Retry configuration.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Custom retry predicate. `SessionError::is_retryable` when unset.
    pub retry_if: Option<RetryPredicate>,
    /// Hook invoked before each retry.
    pub on_retry: Option<RetryHook>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        DEFAULT_RETRY_CONFIG
    }
}

/// Default retry configuration.
pub const DEFAULT_RETRY_CONFIG: RetryConfig = RetryConfig {
    max_retries: 3,
    base_delay: Duration::from_secs(1),
    max_delay: Duration::from_secs(30),
    backoff_multiplier: 2.0,
    retry_if: None,
    on_retry: None,
};

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("retry_if", &self.retry_if.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryConfig {
    /// Create a configuration with `max_retries` retries.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a no-retry configuration.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Set the delay before the first retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set a custom retry predicate.
    pub fn with_retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SessionError, u32) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Set a hook invoked before each retry.
    pub fn with_on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryAttempt<'_>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff for the attempt that just failed, using a jitter factor in
    /// `[0.5, 1.0)`.
    pub fn delay_for_attempt(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw_ms = self.base_delay.as_millis() as f64
            * self.backoff_multiplier.powi(exponent)
            * jitter;
        let max_ms = self.max_delay.as_millis() as f64;
        let capped = if raw_ms.is_finite() { raw_ms.min(max_ms) } else { max_ms };

        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// Retry statistics.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub total_attempts: u32,
    pub successful_retries: u32,
    pub failed_operations: u32,
}

/// Executes operations with exponential backoff.
pub struct RetryExecutor {
    config: RetryConfig,
    stats: Mutex<RetryStats>,
    metrics: Arc<dyn SessionMetrics>,
}

impl RetryExecutor {
    /// Create new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(RetryStats::default()),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Attach a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic.
    ///
    /// The final error is returned unchanged once the budget is spent or the
    /// predicate declines to retry.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, SessionError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 1;

        loop {
            self.stats.lock().total_attempts += 1;

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                        self.stats.lock().successful_retries += 1;
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if attempt >= max_attempts || !self.should_retry(&error, attempt) {
                        if attempt > 1 {
                            warn!(
                                attempt,
                                max_retries = self.config.max_retries,
                                error = %error,
                                "Operation failed after retries"
                            );
                        }
                        self.stats.lock().failed_operations += 1;
                        return Err(error);
                    }

                    let jitter = rand::thread_rng().gen_range(0.5..1.0);
                    let delay = self.config.delay_for_attempt(attempt, jitter);

                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying operation after backoff"
                    );

                    if let Some(hook) = &self.config.on_retry {
                        hook(&RetryAttempt {
                            attempt,
                            delay,
                            error: &error,
                        });
                    }
                    self.metrics.record_retry(attempt + 1);

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Check if a failed attempt should be retried.
    pub fn should_retry(&self, error: &SessionError, attempt: u32) -> bool {
        match &self.config.retry_if {
            Some(predicate) => predicate(error, attempt),
            None => error.is_retryable(),
        }
    }

    /// Get retry statistics.
    pub fn get_stats(&self) -> RetryStats {
        self.stats.lock().clone()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
