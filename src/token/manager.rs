//! Token Manager
//!
//! Schedules a single proactive refresh ahead of bearer token expiry and
//! de-duplicates concurrent refresh attempts.
//!
//! Outcomes are returned from every call and also published as
//! [`TokenEvent`]s to subscribers. Scheduling spawns Tokio tasks, so the
//! manager must be driven from inside a Tokio runtime.
//!
//! Scheduled refreshes never spin: a token that is still inside the refresh
//! threshold right after a refresh is retried after the minimum interval, and
//! a token that will expire before its next refresh can run gets a timer that
//! publishes [`TokenEvent::Expired`] at expiry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{decode_expiry, TokenSource};
use crate::telemetry::{NoOpMetrics, SessionMetrics};
use crate::token::TokenRefresher;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Shortest wait before a scheduled refresh runs again.
pub const MIN_REARM_DELAY: Duration = Duration::from_secs(1);

/// Token manager configuration.
#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    /// How long before expiry to refresh (default: 5 minutes).
    pub refresh_threshold: Duration,
    /// Minimum time between two scheduled refresh attempts (default: 30 seconds).
    pub min_refresh_interval: Duration,
}

impl Default for TokenManagerConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(5 * 60),
            min_refresh_interval: Duration::from_secs(30),
        }
    }
}

impl TokenManagerConfig {
    /// Set the refresh threshold in minutes.
    pub fn refresh_threshold_minutes(mut self, minutes: u64) -> Self {
        self.refresh_threshold = Duration::from_secs(minutes * 60);
        self
    }

    /// Set the minimum interval between refresh attempts.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }
}

/// Notification published by the token manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// The refresher renewed the session.
    Refreshed,
    /// The session is over: the token expired or could not be renewed.
    Expired { reason: String },
}

/// Result of scheduling a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Token already expired or unreadable; `Expired` was published.
    Expired,
    /// Token is inside the refresh threshold; a refresh was started now.
    RefreshingNow,
    /// A refresh timer was armed.
    Scheduled { refresh_in: Duration },
    /// No refresh can run before expiry; `Expired` is published when the
    /// token runs out.
    AwaitingExpiry { expires_in: Duration },
    /// No token in the configured source.
    NoToken,
    /// The manager was destroyed.
    Destroyed,
}

/// Result of a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// The refresher failed or declined; `Expired` was published.
    Failed,
    /// Another refresh is in flight.
    SkippedInProgress,
    /// The previous attempt was less than `min_refresh_interval` ago.
    SkippedTooSoon,
    Destroyed,
}

/// Check whether a bearer token is expired. Unreadable tokens are expired.
pub fn is_token_expired(token: &str) -> bool {
    match decode_expiry(token) {
        Ok(expires_at) => expires_at <= Utc::now(),
        Err(_) => true,
    }
}

/// Who asked for a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Caller,
    /// Re-arm from the token source after a successful refresh.
    Rearm,
}

#[derive(Default)]
struct ManagerState {
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the schedule is replaced or cleared.
    generation: u64,
    refreshing: bool,
    last_attempt: Option<Instant>,
    destroyed: bool,
    events: Option<broadcast::Sender<TokenEvent>>,
}

impl ManagerState {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct ManagerInner<R> {
    config: TokenManagerConfig,
    refresher: R,
    source: Option<Arc<dyn TokenSource>>,
    state: Mutex<ManagerState>,
    metrics: Arc<dyn SessionMetrics>,
}

/// Clears the in-flight flag even if the refresh future is dropped.
struct InFlight<'a> {
    state: &'a Mutex<ManagerState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().refreshing = false;
    }
}

fn until(expires_at: DateTime<Utc>) -> Duration {
    (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

impl<R: TokenRefresher + 'static> ManagerInner<R> {
    fn schedule(self: &Arc<Self>, token: &str, trigger: Trigger) -> ScheduleOutcome {
        let mut state = self.state.lock();
        if state.destroyed {
            return ScheduleOutcome::Destroyed;
        }
        state.cancel_timer();

        let expires_at = match decode_expiry(token) {
            Ok(expires_at) => expires_at,
            Err(e) => {
                drop(state);
                self.publish_expired(format!("unreadable token: {}", e));
                return ScheduleOutcome::Expired;
            }
        };

        if expires_at <= Utc::now() {
            drop(state);
            self.publish_expired("token expired".to_string());
            return ScheduleOutcome::Expired;
        }

        let refresh_in = until(expires_at).saturating_sub(self.config.refresh_threshold);
        if !refresh_in.is_zero() {
            debug!(
                %expires_at,
                refresh_in_ms = refresh_in.as_millis() as u64,
                "Scheduled token refresh"
            );
            return self.arm(&mut state, expires_at, refresh_in);
        }

        match trigger {
            Trigger::Caller => {
                debug!(%expires_at, "Token inside refresh threshold, refreshing now");
                let generation = state.generation;
                drop(state);
                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    inner.scheduled_refresh(expires_at, generation).await;
                });
                ScheduleOutcome::RefreshingNow
            }
            Trigger::Rearm => {
                let delay = self.config.min_refresh_interval.max(MIN_REARM_DELAY);
                warn!(
                    %expires_at,
                    delay_ms = delay.as_millis() as u64,
                    "Refreshed token is still inside the refresh threshold, backing off"
                );
                self.arm(&mut state, expires_at, delay)
            }
        }
    }

    /// Arm the single timer: a refresh after `delay`, or an expiry notice
    /// when the token runs out first.
    fn arm(
        self: &Arc<Self>,
        state: &mut ManagerState,
        expires_at: DateTime<Utc>,
        delay: Duration,
    ) -> ScheduleOutcome {
        let expires_in = until(expires_at);
        let generation = state.generation;
        let inner = Arc::clone(self);

        if delay <= expires_in {
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // Detached so cancelling the timer never aborts an in-flight refresh.
                tokio::spawn(async move {
                    inner.scheduled_refresh(expires_at, generation).await;
                });
            }));
            ScheduleOutcome::Scheduled { refresh_in: delay }
        } else {
            debug!(
                %expires_at,
                delay_ms = delay.as_millis() as u64,
                "Token expires before the next refresh can run"
            );
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(expires_in).await;
                inner.publish_expired("token expired before it could be refreshed".to_string());
            }));
            ScheduleOutcome::AwaitingExpiry { expires_in }
        }
    }

    /// Refresh started by the schedule. A refresh skipped for being too soon
    /// is retried once the interval has passed.
    async fn scheduled_refresh(self: &Arc<Self>, expires_at: DateTime<Utc>, generation: u64) {
        if self.refresh(true).await == RefreshOutcome::SkippedTooSoon {
            self.follow_up(expires_at, generation);
        }
    }

    fn follow_up(self: &Arc<Self>, expires_at: DateTime<Utc>, generation: u64) {
        let mut state = self.state.lock();
        if state.destroyed || state.generation != generation {
            return;
        }
        let remaining = state
            .last_attempt
            .map(|last| self.config.min_refresh_interval.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO)
            .max(MIN_REARM_DELAY);

        debug!(
            remaining_ms = remaining.as_millis() as u64,
            "Scheduled refresh skipped, retrying after the minimum interval"
        );
        state.cancel_timer();
        self.arm(&mut state, expires_at, remaining);
    }

    async fn refresh(self: &Arc<Self>, respect_interval: bool) -> RefreshOutcome {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return RefreshOutcome::Destroyed;
            }
            if state.refreshing {
                debug!("Token refresh already in progress, skipping");
                self.metrics.record_refresh_skipped("in_progress");
                return RefreshOutcome::SkippedInProgress;
            }
            if respect_interval {
                if let Some(last) = state.last_attempt {
                    if last.elapsed() < self.config.min_refresh_interval {
                        debug!("Token refresh attempted too recently, skipping");
                        self.metrics.record_refresh_skipped("too_soon");
                        return RefreshOutcome::SkippedTooSoon;
                    }
                }
            }
            state.refreshing = true;
            state.last_attempt = Some(Instant::now());
        }

        let result = {
            let _in_flight = InFlight { state: &self.state };
            self.refresher.refresh().await
        };

        match result {
            Ok(true) => {
                info!("Token refreshed");
                self.metrics.record_token_refresh(true);
                self.publish(TokenEvent::Refreshed);
                self.rearm_from_source();
                RefreshOutcome::Refreshed
            }
            Ok(false) => {
                warn!("Token refresh was declined");
                self.metrics.record_token_refresh(false);
                self.publish_expired("refresh declined".to_string());
                RefreshOutcome::Failed
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.metrics.record_token_refresh(false);
                self.publish_expired(e.to_string());
                RefreshOutcome::Failed
            }
        }
    }

    fn rearm_from_source(self: &Arc<Self>) {
        if let Some(source) = &self.source {
            match source.current_token() {
                Some(token) => {
                    self.schedule(token.expose_secret(), Trigger::Rearm);
                }
                None => debug!("No token in source after refresh"),
            }
        }
    }

    fn publish_expired(&self, reason: String) {
        info!(reason = %reason, "Token expired");
        self.publish(TokenEvent::Expired { reason });
    }

    fn publish(&self, event: TokenEvent) {
        if let Some(events) = &self.state.lock().events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }
}

/// Token manager handle. Clones share the same schedule.
pub struct TokenManager<R: TokenRefresher + 'static> {
    inner: Arc<ManagerInner<R>>,
}

impl<R: TokenRefresher + 'static> Clone for TokenManager<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: TokenRefresher + 'static> TokenManager<R> {
    /// Create new token manager.
    pub fn new(config: TokenManagerConfig, refresher: R) -> Self {
        Self::builder(refresher).config(config).build()
    }

    /// Start building a token manager.
    pub fn builder(refresher: R) -> TokenManagerBuilder<R> {
        TokenManagerBuilder {
            config: TokenManagerConfig::default(),
            refresher,
            source: None,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &TokenManagerConfig {
        &self.inner.config
    }

    /// Subscribe to refresh/expiry notifications. After `destroy` the
    /// receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        match &self.inner.state.lock().events {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Check whether a bearer token is expired. Unreadable tokens are expired.
    pub fn is_token_expired(&self, token: &str) -> bool {
        is_token_expired(token)
    }

    /// Arm the refresh schedule for `token`, replacing any pending timer.
    pub fn schedule_token_refresh(&self, token: &str) -> ScheduleOutcome {
        self.inner.schedule(token, Trigger::Caller)
    }

    /// Arm the schedule from the configured token source.
    pub fn start(&self) -> ScheduleOutcome {
        let token = self.inner.source.as_ref().and_then(|s| s.current_token());
        match token {
            Some(token) => self.inner.schedule(token.expose_secret(), Trigger::Caller),
            None => {
                debug!("No token available, nothing to schedule");
                ScheduleOutcome::NoToken
            }
        }
    }

    /// Refresh now unless one is in flight or the last attempt was too recent.
    pub async fn attempt_refresh(&self) -> RefreshOutcome {
        self.inner.refresh(true).await
    }

    /// Cancel the pending timer and refresh now, ignoring the minimum interval.
    pub async fn force_refresh(&self) -> RefreshOutcome {
        self.clear_scheduled_refresh();
        self.inner.refresh(false).await
    }

    /// Cancel the pending timer, if any.
    pub fn clear_scheduled_refresh(&self) {
        self.inner.state.lock().cancel_timer();
    }

    /// Whether a timer (refresh or expiry notice) is armed and has not fired.
    pub fn has_pending_refresh(&self) -> bool {
        self.inner
            .state
            .lock()
            .timer
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// Whether a refresh call is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().refreshing
    }

    /// Cancel the pending timer and close the event channel. Idempotent.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        if !state.destroyed {
            debug!("Token manager destroyed");
        }
        state.cancel_timer();
        state.events = None;
        state.destroyed = true;
    }

    /// Whether `destroy` was called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }
}

/// Token manager builder.
pub struct TokenManagerBuilder<R> {
    config: TokenManagerConfig,
    refresher: R,
    source: Option<Arc<dyn TokenSource>>,
    metrics: Arc<dyn SessionMetrics>,
}

impl<R: TokenRefresher + 'static> TokenManagerBuilder<R> {
    /// Set the configuration.
    pub fn config(mut self, config: TokenManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Read tokens from `source`; successful refreshes re-arm from it.
    pub fn source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach a metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build the token manager.
    pub fn build(self) -> TokenManager<R> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        TokenManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                refresher: self.refresher,
                source: self.source,
                state: Mutex::new(ManagerState {
                    events: Some(events),
                    ..ManagerState::default()
                }),
                metrics: self.metrics,
            }),
        }
    }
}
