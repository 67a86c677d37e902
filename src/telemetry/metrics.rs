//! Metrics
//!
//! Metrics sink for retries, circuit transitions and token refreshes.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::resilience::CircuitState;

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Session metrics interface.
pub trait SessionMetrics: Send + Sync {
    /// Record a retry before attempt number `attempt`.
    fn record_retry(&self, attempt: u32);

    /// Record a circuit breaker state change.
    fn record_circuit_state(&self, state: CircuitState);

    /// Record a call rejected by an open circuit.
    fn record_circuit_rejection(&self);

    /// Record a token refresh attempt.
    fn record_token_refresh(&self, success: bool);

    /// Record a refresh attempt that was skipped.
    fn record_refresh_skipped(&self, reason: &str);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl SessionMetrics for NoOpMetrics {
    fn record_retry(&self, _attempt: u32) {}
    fn record_circuit_state(&self, _state: CircuitState) {}
    fn record_circuit_rejection(&self) {}
    fn record_token_refresh(&self, _success: bool) {}
    fn record_refresh_skipped(&self, _reason: &str) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
    pub timestamp: u64,
}

/// In-memory metrics for testing.
#[derive(Default)]
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.entries.lock().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Count entries by name.
    pub fn count(&self, name: &str) -> usize {
        self.entries.lock().iter().filter(|e| e.name == name).count()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn record(&self, name: &str, value: f64, labels: MetricLabels) {
        self.entries.lock().push(MetricEntry {
            name: name.to_string(),
            value,
            labels,
            timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
        });
    }
}

fn label(key: &str, value: impl ToString) -> MetricLabels {
    let mut labels = MetricLabels::new();
    labels.insert(key.to_string(), value.to_string());
    labels
}

impl SessionMetrics for InMemoryMetrics {
    fn record_retry(&self, attempt: u32) {
        self.record("session_retries_total", 1.0, label("attempt", attempt));
    }

    fn record_circuit_state(&self, state: CircuitState) {
        self.record("session_circuit_breaker_state", 1.0, label("state", state));
    }

    fn record_circuit_rejection(&self) {
        self.record("session_circuit_rejections_total", 1.0, MetricLabels::new());
    }

    fn record_token_refresh(&self, success: bool) {
        self.record("session_token_refreshes_total", 1.0, label("success", success));
    }

    fn record_refresh_skipped(&self, reason: &str) {
        self.record("session_token_refresh_skipped_total", 1.0, label("reason", reason));
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_metrics() {
        let metrics = no_op_metrics();
        metrics.record_retry(2);
        metrics.record_circuit_state(CircuitState::Open);
        metrics.record_token_refresh(false);
    }

    #[test]
    fn test_in_memory_metrics() {
        let metrics = InMemoryMetrics::new();

        metrics.record_circuit_state(CircuitState::HalfOpen);
        metrics.record_token_refresh(true);
        metrics.record_token_refresh(false);

        assert_eq!(metrics.get_entries().len(), 3);
        assert_eq!(metrics.count("session_token_refreshes_total"), 2);

        let states = metrics.get_entries_by_name("session_circuit_breaker_state");
        assert_eq!(states[0].labels.get("state"), Some(&"half-open".to_string()));

        metrics.clear();
        assert!(metrics.get_entries().is_empty());
    }
}
