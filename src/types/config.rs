//! Configuration Types
//!
//! Top-level session configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use crate::telemetry::TracerConfig;
use crate::token::TokenManagerConfig;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Default trace sampling rate for this environment.
    pub fn default_sample_rate(&self) -> f64 {
        match self {
            Environment::Development => 1.0,
            Environment::Production => 0.1,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigurationError::InvalidValue {
                field: "environment".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Complete session resilience configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Retry executor settings.
    pub retry: RetryConfig,
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Token manager settings.
    pub token: TokenManagerConfig,
    /// Trace recorder settings.
    pub tracer: TracerConfig,
}
