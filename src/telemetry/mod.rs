//! Telemetry
//!
//! Observability components for session operations.
//!
//! This module provides:
//!
//! - **Metrics**: Counters for retries, circuit transitions and refreshes
//! - **Recorder**: Span recording with bounded history and latency aggregates
//! - **Propagation**: Trace context carried in request headers

pub mod metrics;
pub mod propagation;
pub mod recorder;

// Metrics
pub use metrics::{
    create_in_memory_metrics, no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels,
    NoOpMetrics, SessionMetrics,
};

// Recorder
pub use recorder::{
    outcome_metadata, ActiveSpan, TraceRecorder, TracerConfig, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_MAX_TRACKED_OPERATIONS,
};

// Propagation
pub use propagation::{
    extract_from_headers, inject_into, inject_into_headers, PARENT_SPAN_ID_HEADER,
    SAMPLED_HEADER, SPAN_ID_HEADER, TRACE_ID_HEADER,
};
