//! Tests for token refresh scheduling.

use chrono::Utc;
use session_resilience::core::{encode_unsigned, InMemoryTokenSource, TokenSource};
use session_resilience::error::{SessionError, TokenError};
use session_resilience::telemetry::{create_in_memory_metrics, SessionMetrics};
use session_resilience::token::{
    MockTokenRefresher, RefreshOutcome, ScheduleOutcome, TokenEvent, TokenManager,
    TokenManagerConfig,
};
use session_resilience::types::TokenClaims;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn token_expiring_in(secs: i64) -> String {
    encode_unsigned(&TokenClaims {
        sub: Some("user-42".to_string()),
        exp: Some(Utc::now().timestamp() + secs),
        ..Default::default()
    })
    .unwrap()
}

/// Let spawned tasks run to completion under paused time.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_token_inside_threshold_refreshes_immediately() {
    let refresher = Arc::new(MockTokenRefresher::new());
    let manager = TokenManager::new(
        TokenManagerConfig::default().refresh_threshold_minutes(5),
        refresher.clone(),
    );
    let mut events = manager.subscribe();

    let outcome = manager.schedule_token_refresh(&token_expiring_in(3 * 60));
    assert_eq!(outcome, ScheduleOutcome::RefreshingNow);
    assert!(!manager.has_pending_refresh());

    assert_eq!(events.recv().await.unwrap(), TokenEvent::Refreshed);
    assert_eq!(refresher.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_refresh_fires_once() {
    let refresher = Arc::new(MockTokenRefresher::new());
    let manager = TokenManager::new(TokenManagerConfig::default(), refresher.clone());

    let first = manager.schedule_token_refresh(&token_expiring_in(3600));
    let second = manager.schedule_token_refresh(&token_expiring_in(1800));
    assert!(matches!(first, ScheduleOutcome::Scheduled { .. }));
    let refresh_in = match second {
        ScheduleOutcome::Scheduled { refresh_in } => refresh_in,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert!(manager.has_pending_refresh());

    tokio::time::sleep(refresh_in + Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(refresher.call_count(), 1);
    assert!(!manager.has_pending_refresh());

    // The replaced 3600s timer never fires.
    tokio::time::sleep(Duration::from_secs(3600)).await;
    settle().await;
    assert_eq!(refresher.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_refreshes_are_deduplicated() {
    let refresher = Arc::new(MockTokenRefresher::new());
    refresher.set_delay(Duration::from_millis(500));
    let manager = TokenManager::new(TokenManagerConfig::default(), refresher.clone());

    let (a, b) = futures::join!(manager.force_refresh(), manager.force_refresh());

    let mut outcomes = [a, b];
    outcomes.sort_by_key(|o| *o == RefreshOutcome::Refreshed);
    assert_eq!(
        outcomes,
        [RefreshOutcome::SkippedInProgress, RefreshOutcome::Refreshed]
    );
    assert_eq!(refresher.call_count(), 1);
    assert!(!manager.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_min_refresh_interval() {
    let refresher = Arc::new(MockTokenRefresher::new());
    let metrics = Arc::new(create_in_memory_metrics());
    let sink: Arc<dyn SessionMetrics> = metrics.clone();
    let manager = TokenManager::builder(refresher.clone())
        .config(TokenManagerConfig::default().with_min_refresh_interval(Duration::from_secs(30)))
        .metrics(sink)
        .build();

    assert_eq!(manager.attempt_refresh().await, RefreshOutcome::Refreshed);
    assert_eq!(manager.attempt_refresh().await, RefreshOutcome::SkippedTooSoon);

    // Forced refreshes ignore the interval.
    assert_eq!(manager.force_refresh().await, RefreshOutcome::Refreshed);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(manager.attempt_refresh().await, RefreshOutcome::Refreshed);

    assert_eq!(refresher.call_count(), 3);
    assert_eq!(metrics.count("session_token_refresh_skipped_total"), 1);
    assert_eq!(metrics.count("session_token_refreshes_total"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_publishes_expired() {
    let refresher = Arc::new(MockTokenRefresher::new());
    refresher.push_response(Err(SessionError::Token(TokenError::RefreshFailed {
        message: "refresh token revoked".to_string(),
    })));
    refresher.push_response(Ok(false));
    let manager = TokenManager::new(
        TokenManagerConfig::default().with_min_refresh_interval(Duration::ZERO),
        refresher.clone(),
    );
    let mut events = manager.subscribe();

    assert_eq!(manager.attempt_refresh().await, RefreshOutcome::Failed);
    match events.recv().await.unwrap() {
        TokenEvent::Expired { reason } => assert!(reason.contains("refresh token revoked")),
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(manager.attempt_refresh().await, RefreshOutcome::Failed);
    assert!(matches!(events.recv().await.unwrap(), TokenEvent::Expired { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_token_is_expired() {
    let manager = TokenManager::new(TokenManagerConfig::default(), MockTokenRefresher::new());
    let mut events = manager.subscribe();

    assert!(manager.is_token_expired("garbage"));
    assert_eq!(manager.schedule_token_refresh("garbage"), ScheduleOutcome::Expired);
    assert!(matches!(events.recv().await.unwrap(), TokenEvent::Expired { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_successful_refresh_rearms_from_source() {
    let source = Arc::new(InMemoryTokenSource::with_token(token_expiring_in(3600)));
    let refresher = Arc::new(MockTokenRefresher::new());
    let dyn_source: Arc<dyn TokenSource> = source.clone();
    let manager = TokenManager::builder(refresher.clone())
        .source(dyn_source)
        .build();

    assert!(matches!(manager.start(), ScheduleOutcome::Scheduled { .. }));

    // The refresher stores a fresh token; the manager picks it up afterwards.
    source.set_token(token_expiring_in(7200));
    assert_eq!(manager.force_refresh().await, RefreshOutcome::Refreshed);
    assert!(manager.has_pending_refresh());

    manager.destroy();
    assert!(!manager.has_pending_refresh());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_cancels_timer_and_silences_events() {
    let refresher = Arc::new(MockTokenRefresher::new());
    let manager = TokenManager::new(TokenManagerConfig::default(), refresher.clone());
    let mut events = manager.subscribe();

    manager.schedule_token_refresh(&token_expiring_in(600));
    manager.destroy();
    manager.destroy();

    tokio::time::sleep(Duration::from_secs(600)).await;
    settle().await;

    assert_eq!(refresher.call_count(), 0);
    assert!(events.try_recv().is_err());
    assert_eq!(manager.attempt_refresh().await, RefreshOutcome::Destroyed);
}

#[tokio::test(start_paused = true)]
async fn test_short_lived_source_token_backs_off_without_interval() {
    // The source keeps handing back a token inside the threshold.
    let source = Arc::new(InMemoryTokenSource::with_token(token_expiring_in(3 * 60)));
    let refresher = Arc::new(MockTokenRefresher::new());
    let dyn_source: Arc<dyn TokenSource> = source.clone();
    let manager = TokenManager::builder(refresher.clone())
        .config(TokenManagerConfig::default().with_min_refresh_interval(Duration::ZERO))
        .source(dyn_source)
        .build();

    assert_eq!(manager.start(), ScheduleOutcome::RefreshingNow);
    for _ in 0..200 {
        tokio::task::yield_now().await;
    }
    assert_eq!(refresher.call_count(), 1);
    assert!(manager.has_pending_refresh());

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(refresher.call_count(), 2);

    manager.destroy();
}

#[tokio::test(start_paused = true)]
async fn test_stale_source_token_expires_instead_of_going_silent() {
    let source = Arc::new(InMemoryTokenSource::with_token(token_expiring_in(20)));
    let refresher = Arc::new(MockTokenRefresher::new());
    let dyn_source: Arc<dyn TokenSource> = source.clone();
    let manager = TokenManager::builder(refresher.clone())
        .source(dyn_source)
        .build();
    let mut events = manager.subscribe();

    assert_eq!(manager.start(), ScheduleOutcome::RefreshingNow);
    assert_eq!(events.recv().await.unwrap(), TokenEvent::Refreshed);
    // The next refresh would land after expiry, so only the expiry watch is armed.
    assert!(manager.has_pending_refresh());

    match events.recv().await.unwrap() {
        TokenEvent::Expired { reason } => assert!(reason.contains("before it could be refreshed")),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(refresher.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_skipped_too_soon_is_retried() {
    let refresher = Arc::new(MockTokenRefresher::new());
    let manager = TokenManager::new(
        TokenManagerConfig::default().with_min_refresh_interval(Duration::from_secs(30)),
        refresher.clone(),
    );

    assert_eq!(manager.attempt_refresh().await, RefreshOutcome::Refreshed);
    assert_eq!(
        manager.schedule_token_refresh(&token_expiring_in(3 * 60)),
        ScheduleOutcome::RefreshingNow
    );
    settle().await;
    assert_eq!(refresher.call_count(), 1);
    assert!(manager.has_pending_refresh());

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(refresher.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_closes_subscribers() {
    let manager = TokenManager::new(TokenManagerConfig::default(), MockTokenRefresher::new());
    let mut events = manager.subscribe();
    let waiter = tokio::spawn(async move { events.recv().await });
    settle().await;

    manager.destroy();

    assert_eq!(waiter.await.unwrap(), Err(RecvError::Closed));
    let mut late = manager.subscribe();
    assert_eq!(late.recv().await, Err(RecvError::Closed));
}
