//! Token Management
//!
//! Bearer token lifecycle: expiry checks, proactive refresh scheduling and
//! refresh de-duplication.
//!
//! This module provides:
//!
//! - **Token Manager**: One refresh timer per manager, in-flight and
//!   minimum-interval guards
//! - **Token Refresher**: The injected call that renews the session

pub mod manager;
pub mod refresher;

// Token Manager
pub use manager::{
    is_token_expired, RefreshOutcome, MIN_REARM_DELAY, ScheduleOutcome, TokenEvent, TokenManager,
    TokenManagerBuilder, TokenManagerConfig,
};

// Token Refresher
pub use refresher::{
    create_mock_token_refresher, refresh_fn, FnTokenRefresher, MockTokenRefresher,
    TokenRefresher,
};
