//! Trace Types
//!
//! Span identity, completed span records and per-operation aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form metadata attached to a finished span.
pub type SpanMetadata = HashMap<String, String>;

/// Outbound/inbound trace propagation headers.
pub type TraceHeaders = HashMap<String, String>;

/// Identity of a span, as propagated between services.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    /// Trace identifier shared by every span of one trace.
    pub trace_id: String,
    /// Identifier of this span.
    pub span_id: String,
    /// Span id of the parent, for child spans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// Whether this trace is recorded.
    pub sampled: bool,
}

/// A completed span.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// Name of the traced operation.
    pub operation: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Duration in milliseconds.
    pub duration_ms: f64,
    pub sampled: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: SpanMetadata,
}

impl SpanRecord {
    /// Whether the span was marked as failed.
    pub fn is_error(&self) -> bool {
        self.metadata.get("success").map(|s| s == "false").unwrap_or(false)
    }
}

/// Running latency aggregate for one operation name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub count: u64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub error_count: u64,
}

impl OperationStats {
    /// Fold one span duration into the aggregate.
    pub fn record(&mut self, duration_ms: f64, is_error: bool) {
        self.count += 1;
        self.total_duration_ms += duration_ms;
        self.avg_duration_ms = self.total_duration_ms / self.count as f64;
        if is_error {
            self.error_count += 1;
        }
    }
}
