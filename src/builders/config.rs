//! Configuration Builder
//!
//! Fluent builder for session configuration, optionally seeded from
//! environment variables.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigurationError, SessionError};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use crate::telemetry::TracerConfig;
use crate::token::TokenManagerConfig;
use crate::types::{Environment, SessionConfig};

pub const ENV_ENVIRONMENT: &str = "SESSION_ENV";
pub const ENV_SAMPLE_RATE: &str = "SESSION_SAMPLE_RATE";
pub const ENV_MAX_RETRIES: &str = "SESSION_MAX_RETRIES";
pub const ENV_BASE_DELAY_MS: &str = "SESSION_BASE_DELAY_MS";
pub const ENV_MAX_DELAY_MS: &str = "SESSION_MAX_DELAY_MS";
pub const ENV_FAILURE_THRESHOLD: &str = "SESSION_FAILURE_THRESHOLD";
pub const ENV_RECOVERY_TIMEOUT_MS: &str = "SESSION_RECOVERY_TIMEOUT_MS";
pub const ENV_REFRESH_THRESHOLD_MINUTES: &str = "SESSION_REFRESH_THRESHOLD_MINUTES";
pub const ENV_MIN_REFRESH_INTERVAL_MS: &str = "SESSION_MIN_REFRESH_INTERVAL_MS";

/// Session configuration builder.
#[derive(Default)]
pub struct SessionConfigBuilder {
    environment: Environment,
    sample_rate: Option<f64>,
    retry: RetryConfig,
    circuit_breaker: CircuitBreakerConfig,
    token: TokenManagerConfig,
    history_capacity: Option<usize>,
    max_tracked_operations: Option<usize>,
}

impl SessionConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_vars(std::env::vars())
    }

    /// Seed a builder from `SESSION_*` key/value pairs. Unknown keys are
    /// ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with("SESSION_"))
            .collect();

        let mut builder = Self::new();

        if let Some(env) = lookup::<Environment>(&vars, ENV_ENVIRONMENT)? {
            builder = builder.environment(env);
        }
        if let Some(rate) = lookup::<f64>(&vars, ENV_SAMPLE_RATE)? {
            builder = builder.sample_rate(rate);
        }
        if let Some(retries) = lookup::<u32>(&vars, ENV_MAX_RETRIES)? {
            builder = builder.max_retries(retries);
        }
        if let Some(ms) = lookup::<u64>(&vars, ENV_BASE_DELAY_MS)? {
            builder = builder.base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = lookup::<u64>(&vars, ENV_MAX_DELAY_MS)? {
            builder = builder.max_delay(Duration::from_millis(ms));
        }
        if let Some(threshold) = lookup::<u32>(&vars, ENV_FAILURE_THRESHOLD)? {
            builder = builder.failure_threshold(threshold);
        }
        if let Some(ms) = lookup::<u64>(&vars, ENV_RECOVERY_TIMEOUT_MS)? {
            builder = builder.recovery_timeout(Duration::from_millis(ms));
        }
        if let Some(minutes) = lookup::<u64>(&vars, ENV_REFRESH_THRESHOLD_MINUTES)? {
            builder = builder.refresh_threshold(Duration::from_secs(minutes * 60));
        }
        if let Some(ms) = lookup::<u64>(&vars, ENV_MIN_REFRESH_INTERVAL_MS)? {
            builder = builder.min_refresh_interval(Duration::from_millis(ms));
        }

        Ok(builder)
    }

    /// Set deployment environment. Picks the default sample rate unless one
    /// is set explicitly.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set trace sample rate.
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Replace the whole retry configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set maximum retries.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    /// Set base retry delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    /// Set retry delay cap.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.retry.max_delay = delay;
        self
    }

    /// Set backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.retry.backoff_multiplier = multiplier;
        self
    }

    /// Set circuit breaker failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker.failure_threshold = threshold;
        self
    }

    /// Set circuit breaker recovery timeout.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.circuit_breaker.recovery_timeout = timeout;
        self
    }

    /// Set how long before expiry tokens are refreshed.
    pub fn refresh_threshold(mut self, threshold: Duration) -> Self {
        self.token.refresh_threshold = threshold;
        self
    }

    /// Set minimum interval between refresh attempts.
    pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
        self.token.min_refresh_interval = interval;
        self
    }

    /// Set number of completed spans kept.
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = Some(capacity);
        self
    }

    /// Set number of operations with latency aggregates.
    pub fn max_tracked_operations(mut self, limit: usize) -> Self {
        self.max_tracked_operations = Some(limit);
        self
    }

    /// Build the session configuration.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let mut tracer = TracerConfig::for_environment(self.environment);

        if let Some(rate) = self.sample_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(invalid_value("sample_rate", rate));
            }
            tracer.sample_rate = rate;
        }
        if let Some(capacity) = self.history_capacity {
            if capacity == 0 {
                return Err(invalid_value("history_capacity", capacity));
            }
            tracer.history_capacity = capacity;
        }
        if let Some(limit) = self.max_tracked_operations {
            if limit == 0 {
                return Err(invalid_value("max_tracked_operations", limit));
            }
            tracer.max_tracked_operations = limit;
        }

        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(invalid_value(
                "backoff_multiplier",
                self.retry.backoff_multiplier,
            ));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(SessionError::Configuration(ConfigurationError::InvalidConfig {
                message: format!(
                    "base_delay ({:?}) exceeds max_delay ({:?})",
                    self.retry.base_delay, self.retry.max_delay
                ),
            }));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(invalid_value("failure_threshold", 0));
        }

        Ok(SessionConfig {
            environment: self.environment,
            retry: self.retry,
            circuit_breaker: self.circuit_breaker,
            token: self.token,
            tracer,
        })
    }
}

/// Create a session configuration builder.
pub fn session_config() -> SessionConfigBuilder {
    SessionConfigBuilder::new()
}

fn invalid_value(field: &str, value: impl ToString) -> SessionError {
    SessionError::Configuration(ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn lookup<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigurationError> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ConfigurationError::InvalidValue {
            field: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
