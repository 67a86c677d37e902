//! Token Refresher
//!
//! The call that actually renews the session (normally a POST to an auth
//! refresh endpoint), injected into the token manager.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::SessionError;

/// Token refresher interface.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Renew the session. `Ok(false)` means the server declined.
    async fn refresh(&self) -> Result<bool, SessionError>;
}

#[async_trait]
impl<R: TokenRefresher + ?Sized> TokenRefresher for Arc<R> {
    async fn refresh(&self) -> Result<bool, SessionError> {
        (**self).refresh().await
    }
}

/// Refresher backed by a closure.
pub struct FnTokenRefresher<F> {
    f: F,
}

/// Wrap a closure returning a refresh future.
pub fn refresh_fn<F, Fut>(f: F) -> FnTokenRefresher<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, SessionError>> + Send + 'static,
{
    FnTokenRefresher { f }
}

#[async_trait]
impl<F, Fut> TokenRefresher for FnTokenRefresher<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, SessionError>> + Send + 'static,
{
    async fn refresh(&self) -> Result<bool, SessionError> {
        (self.f)().await
    }
}

/// Mock token refresher for testing.
#[derive(Default)]
pub struct MockTokenRefresher {
    responses: Mutex<VecDeque<Result<bool, SessionError>>>,
    delay: Mutex<Option<Duration>>,
    call_count: AtomicU32,
}

impl MockTokenRefresher {
    /// Create a mock that succeeds unless told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next call.
    pub fn push_response(&self, response: Result<bool, SessionError>) -> &Self {
        self.responses.lock().push_back(response);
        self
    }

    /// Make every call take `delay`.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Number of refresh calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for MockTokenRefresher {
    async fn refresh(&self) -> Result<bool, SessionError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().pop_front();
        next.unwrap_or(Ok(true))
    }
}

/// Create mock token refresher for testing.
pub fn create_mock_token_refresher() -> MockTokenRefresher {
    MockTokenRefresher::new()
}
