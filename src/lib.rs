//! Session Resilience
//!
//! Client-side session resilience toolkit: retries with exponential backoff,
//! a circuit breaker, proactive bearer-token refresh and lightweight
//! distributed tracing with header propagation.
//!
//! # Features
//!
//! - Retry executor with capped exponential backoff and jitter
//! - Closed / open / half-open circuit breaker with timed recovery
//! - Token manager that refreshes ahead of expiry and de-duplicates refreshes
//! - Trace recorder with bounded span history and per-operation latency stats
//! - `x-trace-id` / `x-span-id` header propagation
//!
//! # Example
//!
//! ```rust,ignore
//! use session_resilience::{session_config, Environment, ResilientClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = session_config()
//!         .environment(Environment::Production)
//!         .max_retries(2)
//!         .failure_threshold(3)
//!         .build()?;
//!
//!     let client = ResilientClient::new(config);
//!
//!     let profile = client
//!         .execute("fetch_profile", None, |headers| async move {
//!             // attach `headers` to the outbound request
//!             send_request(headers).await
//!         })
//!         .await?;
//!
//!     println!("{}", client.recorder().export_spans_json()?);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: Configuration, token claims and span types
//! - `error`: Error hierarchy and HTTP status mapping
//! - `core`: Identifier generation, bearer token decoding, ring buffer, token source
//! - `resilience`: Retry executor and circuit breaker
//! - `token`: Token manager and refresher interface
//! - `telemetry`: Metrics, trace recorder and header propagation
//! - `builders`: Fluent configuration builder
//! - `client`: Resilient client combining tracing, retry and circuit breaking

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod resilience;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export main client
pub use client::{resilient_client, ResilientClient};

// Re-export builders
pub use builders::{session_config, SessionConfigBuilder};

// Re-export errors
pub use error::{
    create_error_from_status, get_user_message, ConfigurationError, HttpError, NetworkError,
    ResilienceError, SessionError, SessionResult, TokenError,
};

// Re-export types
pub use types::{
    // Config
    Environment, SessionConfig,
    // Token
    TokenClaims,
    // Trace
    OperationStats, SpanContext, SpanMetadata, SpanRecord, TraceHeaders,
};

// Re-export core components
pub use crate::core::{
    // Identifiers
    generate_span_id, generate_trace_id,
    // Bearer tokens
    decode_claims, decode_expiry,
    // Ring buffer
    RingBuffer,
    // Token source
    InMemoryTokenSource, TokenSource,
};

// Re-export resilience
pub use resilience::{
    // Retry
    RetryAttempt, RetryConfig, RetryExecutor, RetryStats, DEFAULT_RETRY_CONFIG,
    // Circuit Breaker
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, CircuitTransition,
    DEFAULT_CIRCUIT_BREAKER_CONFIG,
};

// Re-export token management
pub use token::{
    // Manager
    is_token_expired, RefreshOutcome, ScheduleOutcome, TokenEvent, TokenManager,
    TokenManagerBuilder, TokenManagerConfig,
    // Refresher
    create_mock_token_refresher, refresh_fn, MockTokenRefresher, TokenRefresher,
};

// Re-export telemetry
pub use telemetry::{
    // Metrics
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, NoOpMetrics,
    SessionMetrics,
    // Recorder
    ActiveSpan, TraceRecorder, TracerConfig,
    // Propagation
    extract_from_headers, inject_into_headers,
};
