//! Trace Recorder
//!
//! Records completed spans into a bounded history and keeps per-operation
//! latency aggregates.
//!
//! A recorder is an ordinary value: construct one and share it through `Arc`.
//! Spans are explicit handles. [`TraceRecorder::start_trace`] and
//! [`TraceRecorder::create_child_span`] return an [`ActiveSpan`] that must be
//! handed back to [`TraceRecorder::end_span`]; parent/child relationships come
//! from the [`SpanContext`] the caller passes in, never from ambient state.
//!
//! [`TraceRecorder::trace_function`] and [`TraceRecorder::trace_async_fn`]
//! wrap a sync or async function so each call records its own span;
//! [`TraceRecorder::trace_future`] traces a single future.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::core::{generate_span_id, generate_trace_id, RingBuffer};
use crate::types::{Environment, OperationStats, SpanContext, SpanMetadata, SpanRecord};

/// Default number of completed spans kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default number of operations with latency aggregates.
pub const DEFAULT_MAX_TRACKED_OPERATIONS: usize = 50;

/// Trace recorder configuration.
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Fraction of new traces that are recorded, in `[0, 1]`.
    pub sample_rate: f64,
    /// Completed spans kept in history.
    pub history_capacity: usize,
    /// Operations tracked in the latency aggregates.
    pub max_tracked_operations: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

impl TracerConfig {
    /// Defaults for an environment: every trace in development, 10% in
    /// production.
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            sample_rate: environment.default_sample_rate(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_tracked_operations: DEFAULT_MAX_TRACKED_OPERATIONS,
        }
    }

    /// Set the sample rate, clamped to `[0, 1]`.
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }
}

/// An open span. Pass it to [`TraceRecorder::end_span`] to complete it.
#[must_use = "an active span is only recorded when passed to end_span"]
#[derive(Debug)]
pub struct ActiveSpan {
    context: SpanContext,
    operation: String,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl ActiveSpan {
    /// Identity of this span, for child spans and header injection.
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn trace_id(&self) -> &str {
        &self.context.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.context.span_id
    }

    pub fn is_sampled(&self) -> bool {
        self.context.sampled
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Default)]
struct OperationTable {
    stats: HashMap<String, OperationStats>,
    order: VecDeque<String>,
}

impl OperationTable {
    fn record(&mut self, operation: &str, duration_ms: f64, is_error: bool, limit: usize) {
        if !self.stats.contains_key(operation) {
            self.order.push_back(operation.to_string());
            while self.order.len() > limit.max(1) {
                if let Some(oldest) = self.order.pop_front() {
                    self.stats.remove(&oldest);
                }
            }
        }
        self.stats
            .entry(operation.to_string())
            .or_default()
            .record(duration_ms, is_error);
    }

    fn clear(&mut self) {
        self.stats.clear();
        self.order.clear();
    }
}

struct RecorderState {
    history: RingBuffer<SpanRecord>,
    operations: OperationTable,
}

/// Span recorder with bounded history.
pub struct TraceRecorder {
    config: TracerConfig,
    state: Mutex<RecorderState>,
}

impl TraceRecorder {
    /// Create new trace recorder.
    pub fn new(config: TracerConfig) -> Self {
        let history = RingBuffer::new(config.history_capacity);
        Self {
            config,
            state: Mutex::new(RecorderState {
                history,
                operations: OperationTable::default(),
            }),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    fn sample(&self) -> bool {
        let rate = self.config.sample_rate;
        if rate >= 1.0 {
            true
        } else if rate <= 0.0 {
            false
        } else {
            rand::thread_rng().gen::<f64>() < rate
        }
    }

    fn open(&self, operation: &str, context: SpanContext) -> ActiveSpan {
        trace!(
            operation,
            trace_id = %context.trace_id,
            span_id = %context.span_id,
            sampled = context.sampled,
            "Span started"
        );
        ActiveSpan {
            context,
            operation: operation.to_string(),
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Start a new trace with a fresh sampling decision.
    pub fn start_trace(&self, operation: &str) -> ActiveSpan {
        let context = SpanContext {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            parent_span_id: None,
            sampled: self.sample(),
        };
        self.open(operation, context)
    }

    /// Start a span under `parent`, inheriting its trace id and sampling
    /// decision.
    pub fn create_child_span(&self, operation: &str, parent: &SpanContext) -> ActiveSpan {
        let context = SpanContext {
            trace_id: parent.trace_id.clone(),
            span_id: generate_span_id(),
            parent_span_id: Some(parent.span_id.clone()),
            sampled: parent.sampled,
        };
        self.open(operation, context)
    }

    /// Start a child of `parent`, or a new trace when there is none.
    pub fn start_span(&self, operation: &str, parent: Option<&SpanContext>) -> ActiveSpan {
        match parent {
            Some(parent) => self.create_child_span(operation, parent),
            None => self.start_trace(operation),
        }
    }

    /// Complete a span.
    ///
    /// Sampled spans are appended to the history (evicting the oldest when
    /// full) and folded into the operation aggregates. Unsampled spans are
    /// dropped and yield `None`.
    pub fn end_span(&self, span: ActiveSpan, metadata: Option<SpanMetadata>) -> Option<SpanRecord> {
        let duration = span.started.elapsed();
        let duration_ms = duration.as_secs_f64() * 1000.0;

        if !span.context.sampled {
            trace!(operation = %span.operation, "Unsampled span ended");
            return None;
        }

        let SpanContext {
            trace_id,
            span_id,
            parent_span_id,
            sampled,
        } = span.context;

        let record = SpanRecord {
            trace_id,
            span_id,
            parent_span_id,
            operation: span.operation,
            start_time: span.start_time,
            end_time: span.start_time
                + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero()),
            duration_ms,
            sampled,
            metadata: metadata.unwrap_or_default(),
        };

        {
            let mut state = self.state.lock();
            state.operations.record(
                &record.operation,
                duration_ms,
                record.is_error(),
                self.config.max_tracked_operations,
            );
            state.history.push(record.clone());
        }

        debug!(
            operation = %record.operation,
            trace_id = %record.trace_id,
            duration_ms,
            "Span completed"
        );

        Some(record)
    }

    /// Wrap `f` so every call runs inside its own span.
    ///
    /// Each call starts a child of `parent` (or a new trace) and ends it with
    /// `success` metadata, plus `error` on failure.
    pub fn trace_function<'a, A, T, E, F>(
        &'a self,
        operation: &'a str,
        parent: Option<&SpanContext>,
        f: F,
    ) -> impl Fn(A) -> Result<T, E> + 'a
    where
        F: Fn(A) -> Result<T, E> + 'a,
        E: fmt::Display,
    {
        let parent = parent.cloned();
        move |arg| {
            let span = self.start_span(operation, parent.as_ref());
            let result = f(arg);
            self.end_span(span, Some(outcome_metadata(&result)));
            result
        }
    }

    /// Wrap an async `f` so every call runs inside its own span.
    ///
    /// The span starts when the wrapper is called and ends when the returned
    /// future settles.
    #[allow(clippy::type_complexity)]
    pub fn trace_async_fn<'a, A, T, E, F, Fut>(
        &'a self,
        operation: &'a str,
        parent: Option<&SpanContext>,
        f: F,
    ) -> impl Fn(A) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>> + 'a
    where
        F: Fn(A) -> Fut + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: fmt::Display + Send + 'a,
    {
        let parent = parent.cloned();
        move |arg| {
            let span = self.start_span(operation, parent.as_ref());
            let future = f(arg);
            Box::pin(async move {
                let result = future.await;
                self.end_span(span, Some(outcome_metadata(&result)));
                result
            })
        }
    }

    /// Run `future` inside a span, ending it when the future settles.
    pub async fn trace_future<T, E, Fut>(
        &self,
        operation: &str,
        parent: Option<&SpanContext>,
        future: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let span = self.start_span(operation, parent);
        let result = future.await;
        self.end_span(span, Some(outcome_metadata(&result)));
        result
    }

    /// Completed spans, oldest first.
    pub fn span_history(&self) -> Vec<SpanRecord> {
        self.state.lock().history.to_vec()
    }

    /// Spans belonging to one trace, oldest first.
    pub fn trace_spans(&self, trace_id: &str) -> Vec<SpanRecord> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|record| record.trace_id == trace_id)
            .cloned()
            .collect()
    }

    /// Latency aggregate for one operation.
    pub fn operation_stats(&self, operation: &str) -> Option<OperationStats> {
        self.state.lock().operations.stats.get(operation).cloned()
    }

    /// Latency aggregates for every tracked operation.
    pub fn all_operation_stats(&self) -> HashMap<String, OperationStats> {
        self.state.lock().operations.stats.clone()
    }

    /// Span history as a JSON array.
    pub fn export_spans_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.span_history())
    }

    /// Drop all history and aggregates.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.operations.clear();
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new(TracerConfig::default())
    }
}

/// `success` / `error` metadata describing a result.
pub fn outcome_metadata<T, E: fmt::Display>(result: &Result<T, E>) -> SpanMetadata {
    let mut metadata = SpanMetadata::new();
    match result {
        Ok(_) => {
            metadata.insert("success".to_string(), "true".to_string());
        }
        Err(e) => {
            metadata.insert("success".to_string(), "false".to_string());
            metadata.insert("error".to_string(), e.to_string());
        }
    }
    metadata
}
