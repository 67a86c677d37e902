//! Tests for retry and circuit breaker behaviour.

use parking_lot::Mutex;
use session_resilience::error::{create_error_from_status, ResilienceError, SessionError};
use session_resilience::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryExecutor,
};
use session_resilience::telemetry::{create_in_memory_metrics, SessionMetrics};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn server_error() -> SessionError {
    create_error_from_status(503, "Service unavailable")
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_on_first_attempt() {
    let executor = RetryExecutor::new(RetryConfig::default());
    let call_count = Arc::new(AtomicUsize::new(0));
    let count = call_count.clone();

    let result = executor
        .execute(|| {
            let c = count.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SessionError>("success".to_string())
            }
        })
        .await;

    assert_eq!(result.unwrap(), "success");
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
    assert_eq!(executor.get_stats().successful_retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_invokes_at_most_max_retries_plus_one() {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let seen = delays.clone();
    let config = RetryConfig::new(3)
        .with_base_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_millis(250))
        .with_on_retry(move |attempt| seen.lock().push((attempt.attempt, attempt.delay)));
    let executor = RetryExecutor::new(config);

    let call_count = AtomicUsize::new(0);
    let result: Result<(), _> = executor
        .execute(|| {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Err(server_error()) }
        })
        .await;

    assert_eq!(result.unwrap_err().status_code(), Some(503));
    assert_eq!(call_count.load(Ordering::SeqCst), 4);

    let delays = delays.lock();
    assert_eq!(delays.len(), 3);
    for (i, (attempt, delay)) in delays.iter().enumerate() {
        assert_eq!(*attempt, i as u32 + 1);
        assert!(*delay <= Duration::from_millis(250));
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_stops_when_predicate_declines() {
    let config = RetryConfig::new(5).with_retry_if(|error, attempt| {
        error.status_code() == Some(503) && attempt < 2
    });
    let executor = RetryExecutor::new(config);
    let call_count = AtomicUsize::new(0);

    let result: Result<(), _> = executor
        .execute(|| {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Err(server_error()) }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(call_count.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_skips_non_retryable_errors() {
    let executor = RetryExecutor::new(RetryConfig::default());
    let call_count = AtomicUsize::new(0);

    let result: Result<(), _> = executor
        .execute(|| {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Err(create_error_from_status(400, "bad input")) }
        })
        .await;

    assert_eq!(result.unwrap_err().status_code(), Some(400));
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_config() {
    let executor = RetryExecutor::new(RetryConfig::no_retry());
    let call_count = AtomicUsize::new(0);

    let _: Result<(), _> = executor
        .execute(|| {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Err(server_error()) }
        })
        .await;

    assert_eq!(call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_records_metrics() {
    let metrics = Arc::new(create_in_memory_metrics());
    let sink: Arc<dyn SessionMetrics> = metrics.clone();
    let executor = RetryExecutor::new(RetryConfig::new(2)).with_metrics(sink);

    let _: Result<(), _> = executor.execute(|| async { Err(server_error()) }).await;

    assert_eq!(metrics.count("session_retries_total"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_opens_after_threshold() {
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(3));
    let call_count = AtomicUsize::new(0);

    for _ in 0..3 {
        let result: Result<(), _> = breaker
            .execute(|| async {
                call_count.fetch_add(1, Ordering::SeqCst);
                Err(server_error())
            })
            .await;
        assert_eq!(result.unwrap_err().status_code(), Some(503));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // Fourth call fails fast without invoking the operation.
    let result: Result<(), _> = breaker
        .execute(|| async {
            call_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

    match result {
        Err(SessionError::Resilience(ResilienceError::CircuitOpen { .. })) => {}
        other => panic!("expected circuit open, got {:?}", other),
    }
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.get_stats().rejected_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_recovers_after_timeout() {
    let config = CircuitBreakerConfig::new(1).with_recovery_timeout(Duration::from_secs(60));
    let breaker = CircuitBreaker::new(config);
    let mut transitions = breaker.subscribe();

    let _: Result<(), _> = breaker.execute(|| async { Err(server_error()) }).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(breaker.next_attempt_at().is_some());

    tokio::time::advance(Duration::from_secs(59)).await;
    let early: Result<(), _> = breaker.execute(|| async { Ok(()) }).await;
    assert!(early.is_err());

    tokio::time::advance(Duration::from_secs(2)).await;
    let result = breaker.execute(|| async { Ok::<_, SessionError>("ok") }).await;
    assert_eq!(result.unwrap(), "ok");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);

    let states: Vec<_> = std::iter::from_fn(|| transitions.try_recv().ok())
        .map(|t| t.to)
        .collect();
    assert_eq!(
        states,
        vec![CircuitState::Open, CircuitState::HalfOpen, CircuitState::Closed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let config = CircuitBreakerConfig::new(2).with_recovery_timeout(Duration::from_secs(1));
    let breaker = CircuitBreaker::new(config);

    breaker.force_open();
    tokio::time::advance(Duration::from_secs(2)).await;

    let _: Result<(), _> = breaker.execute(|| async { Err(server_error()) }).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    breaker.reset();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.next_attempt_at().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_retry_around_breaker_stops_on_open_circuit() {
    let executor = RetryExecutor::new(RetryConfig::new(5));
    let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(2));
    let call_count = AtomicUsize::new(0);

    let result: Result<(), _> = executor
        .execute(|| {
            breaker.execute(|| async {
                call_count.fetch_add(1, Ordering::SeqCst);
                Err(server_error())
            })
        })
        .await;

    // Two real failures open the circuit; the rejection is not retryable.
    assert!(matches!(
        result,
        Err(SessionError::Resilience(ResilienceError::CircuitOpen { .. }))
    ));
    assert_eq!(call_count.load(Ordering::SeqCst), 2);
}
