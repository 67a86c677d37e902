//! Resilience
//!
//! Resilience patterns for outbound calls.
//!
//! This module provides:
//!
//! - **Retry**: Exponential backoff retry with jitter
//! - **Circuit Breaker**: Fail fast while a dependency is unhealthy

pub mod circuit_breaker;
pub mod retry;

// Retry
pub use retry::{
    RetryAttempt, RetryConfig, RetryExecutor, RetryHook, RetryPredicate, RetryStats,
    DEFAULT_RETRY_CONFIG,
};

// Circuit Breaker
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, CircuitTransition,
    DEFAULT_CIRCUIT_BREAKER_CONFIG,
};
