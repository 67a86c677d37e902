//! Circuit Breaker
//!
//! Stops calling a failing dependency for a cool-down window after repeated
//! failures.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ResilienceError, SessionError};
use crate::telemetry::{NoOpMetrics, SessionMetrics};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, a trial request is allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// A state change, delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial request.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        DEFAULT_CIRCUIT_BREAKER_CONFIG
    }
}

/// Default circuit breaker configuration.
pub const DEFAULT_CIRCUIT_BREAKER_CONFIG: CircuitBreakerConfig = CircuitBreakerConfig {
    failure_threshold: 5,
    recovery_timeout: Duration::from_secs(60),
};

impl CircuitBreakerConfig {
    /// Create a configuration opening after `failure_threshold` failures.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold,
            ..Default::default()
        }
    }

    /// Set the recovery timeout.
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

/// Circuit breaker statistics.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerStats {
    pub total_requests: u32,
    pub successful_requests: u32,
    pub failed_requests: u32,
    pub rejected_requests: u32,
    pub state_transitions: u32,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    next_attempt: Option<Instant>,
    stats: CircuitBreakerStats,
}

/// Circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    events: broadcast::Sender<CircuitTransition>,
    metrics: Arc<dyn SessionMetrics>,
}

impl CircuitBreaker {
    /// Create new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                next_attempt: None,
                stats: CircuitBreakerStats::default(),
            }),
            events,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Attach a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<CircuitTransition> {
        self.events.subscribe()
    }

    /// Execute an operation through the circuit breaker.
    ///
    /// While open, fails with [`ResilienceError::CircuitOpen`] without calling
    /// `operation`.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        self.try_acquire()?;

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }

    /// Admit or reject a call, moving an expired open circuit to half-open.
    fn try_acquire(&self) -> Result<(), SessionError> {
        let mut guard = self.state.lock();
        guard.stats.total_requests += 1;

        if guard.state == CircuitState::Open {
            let now = Instant::now();
            let next_attempt = guard.next_attempt;
            match next_attempt {
                Some(next) if now < next => {
                    guard.stats.rejected_requests += 1;
                    drop(guard);

                    self.metrics.record_circuit_rejection();
                    let next_attempt_at = Utc::now() + to_chrono(next - now);
                    debug!(%next_attempt_at, "Circuit breaker rejected call");
                    return Err(SessionError::Resilience(ResilienceError::CircuitOpen {
                        next_attempt_at,
                    }));
                }
                _ => self.transition(&mut guard, CircuitState::HalfOpen),
            }
        }

        Ok(())
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut guard = self.state.lock();
        guard.stats.successful_requests += 1;
        guard.failure_count = 0;

        if guard.state == CircuitState::HalfOpen {
            self.transition(&mut guard, CircuitState::Closed);
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut guard = self.state.lock();
        guard.stats.failed_requests += 1;
        guard.failure_count = guard.failure_count.saturating_add(1);

        debug!(
            failure_count = guard.failure_count,
            threshold = self.config.failure_threshold,
            "Circuit breaker recorded failure"
        );

        let should_open = match guard.state {
            CircuitState::HalfOpen => {
                warn!("Circuit breaker failure in half-open state, opening circuit");
                true
            }
            CircuitState::Closed => guard.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if should_open {
            self.open(&mut guard);
        }
    }

    /// Return to closed with zero failures.
    pub fn reset(&self) {
        info!("Circuit breaker manually reset");
        let mut guard = self.state.lock();
        guard.failure_count = 0;
        self.transition(&mut guard, CircuitState::Closed);
    }

    /// Enter open with a fresh cool-down window.
    pub fn force_open(&self) {
        info!("Circuit breaker manually opened");
        let mut guard = self.state.lock();
        self.open(&mut guard);
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Consecutive failures since the last success or reset.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// When an open circuit will admit its next trial call.
    pub fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
        let guard = self.state.lock();
        if guard.state != CircuitState::Open {
            return None;
        }
        guard.next_attempt.map(|next| {
            let remaining = next.saturating_duration_since(Instant::now());
            Utc::now() + to_chrono(remaining)
        })
    }

    /// Get circuit breaker statistics.
    pub fn get_stats(&self) -> CircuitBreakerStats {
        self.state.lock().stats.clone()
    }

    fn open(&self, guard: &mut BreakerState) {
        guard.next_attempt = Some(Instant::now() + self.config.recovery_timeout);
        self.transition(guard, CircuitState::Open);
    }

    fn transition(&self, guard: &mut BreakerState, to: CircuitState) {
        let from = guard.state;
        if to != CircuitState::Open {
            guard.next_attempt = None;
        }
        if from == to {
            return;
        }

        info!(from = %from, to = %to, "Circuit breaker state transition");

        guard.state = to;
        guard.stats.state_transitions += 1;
        self.metrics.record_circuit_state(to);

        // No subscribers is fine.
        let _ = self.events.send(CircuitTransition {
            from,
            to,
            at: Utc::now(),
        });
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::create_error_from_status;

    async fn fail(cb: &CircuitBreaker) {
        let _ = cb
            .execute(|| async { Err::<(), _>(create_error_from_status(500, "")) })
            .await;
    }

    #[test]
    fn test_circuit_state() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }

    #[tokio::test]
    async fn test_successful_execution() {
        let cb = CircuitBreaker::default();

        let result = cb.execute(|| async { Ok::<_, SessionError>("success") }).await;

        assert!(result.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::new(3));
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.failure_count(), 2);

        let _ = cb.execute(|| async { Ok::<_, SessionError>(()) }).await;
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new(1).with_recovery_timeout(Duration::from_secs(10)),
        );
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&cb).await;

        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.next_attempt_at().is_some());
        assert_eq!(cb.get_stats().state_transitions, 3);
    }

    #[tokio::test]
    async fn test_force_open_and_reset() {
        let cb = CircuitBreaker::default();
        let mut events = cb.subscribe();

        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.next_attempt_at().is_none());

        let first = events.recv().await.unwrap();
        assert_eq!((first.from, first.to), (CircuitState::Closed, CircuitState::Open));
        let second = events.recv().await.unwrap();
        assert_eq!((second.from, second.to), (CircuitState::Open, CircuitState::Closed));
    }
}
