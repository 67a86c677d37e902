//! Resilient Client
//!
//! Runs outbound calls inside a span, with retry around a circuit breaker.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{SessionError, SessionResult};
use crate::resilience::{CircuitBreaker, RetryExecutor};
use crate::telemetry::{
    inject_into_headers, outcome_metadata, SessionMetrics, TraceRecorder,
};
use crate::types::{SessionConfig, SpanContext, TraceHeaders};

/// Composes the trace recorder, retry executor and circuit breaker for
/// outbound calls.
pub struct ResilientClient {
    recorder: Arc<TraceRecorder>,
    retry: RetryExecutor,
    breaker: CircuitBreaker,
}

impl ResilientClient {
    /// Create a client with its own recorder.
    pub fn new(config: SessionConfig) -> Self {
        let recorder = Arc::new(TraceRecorder::new(config.tracer.clone()));
        Self::with_recorder(config, recorder)
    }

    /// Create a client that records into a shared recorder.
    pub fn with_recorder(config: SessionConfig, recorder: Arc<TraceRecorder>) -> Self {
        Self {
            recorder,
            retry: RetryExecutor::new(config.retry),
            breaker: CircuitBreaker::new(config.circuit_breaker),
        }
    }

    /// Attach a metrics sink to the retry executor and circuit breaker.
    pub fn with_metrics(self, metrics: Arc<dyn SessionMetrics>) -> Self {
        Self {
            recorder: self.recorder,
            retry: self.retry.with_metrics(Arc::clone(&metrics)),
            breaker: self.breaker.with_metrics(metrics),
        }
    }

    /// Run `call` as `operation`.
    ///
    /// Opens a span (a child of `parent` when given), passes its propagation
    /// headers to every attempt, retries failed attempts through the circuit
    /// breaker and ends the span with the outcome and attempt count.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        parent: Option<&SpanContext>,
        call: F,
    ) -> SessionResult<T>
    where
        F: Fn(TraceHeaders) -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let span = self.recorder.start_span(operation, parent);
        let headers = inject_into_headers(span.context());
        let attempts = AtomicU32::new(0);

        let breaker = &self.breaker;
        let call = &call;
        let headers = &headers;
        let counter = &attempts;
        let result = self
            .retry
            .execute(move || async move {
                counter.fetch_add(1, Ordering::Relaxed);
                breaker.execute(move || call(headers.clone())).await
            })
            .await;

        let mut metadata = outcome_metadata(&result);
        metadata.insert(
            "attempts".to_string(),
            attempts.load(Ordering::Relaxed).to_string(),
        );
        if let Err(e) = &result {
            metadata.insert("error_code".to_string(), e.error_code().to_string());
        }
        self.recorder.end_span(span, Some(metadata));

        result
    }

    /// Get the trace recorder.
    pub fn recorder(&self) -> &Arc<TraceRecorder> {
        &self.recorder
    }

    /// Get the retry executor.
    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Get the circuit breaker.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

/// Create a resilient client.
pub fn resilient_client(config: SessionConfig) -> ResilientClient {
    ResilientClient::new(config)
}
