//! Session Error Types
//!
//! Error hierarchy shared by the retry executor, circuit breaker, token
//! manager and trace recorder.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Root error type for session resilience operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Resilience error: {0}")]
    Resilience(#[from] ResilienceError),
}

impl SessionError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "SESSION_CONFIG",
            Self::Network(_) => "SESSION_NETWORK",
            Self::Http(_) => "SESSION_HTTP",
            Self::Token(_) => "SESSION_TOKEN",
            Self::Resilience(_) => "SESSION_RESILIENCE",
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http(HttpError::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Check if error is retryable.
    ///
    /// Requests that never got a response are retried, as are 5xx, 408 and
    /// 429 responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http(HttpError::Status { status, .. }) => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Check if error requires re-authentication.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Token(_) => true,
            Self::Http(HttpError::Status { status, .. }) => *status == 401,
            _ => false,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

/// Failure before any response was received.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("No response received: {message}")]
    NoResponse { message: String },
}

/// Response with a non-success status.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

/// Token-related error.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed token: {message}")]
    Malformed { message: String },

    #[error("Token has no expiry claim")]
    MissingExpiry,

    #[error("Token expired")]
    Expired,

    #[error("No token available")]
    NotFound,

    #[error("Token refresh failed: {message}")]
    RefreshFailed { message: String },
}

/// Errors raised by the resilience layer itself.
#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("Circuit breaker is open, next attempt at {next_attempt_at}")]
    CircuitOpen { next_attempt_at: DateTime<Utc> },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Create error from an HTTP status and body.
pub fn create_error_from_status(status: u16, body: &str) -> SessionError {
    let message = if body.trim().is_empty() {
        match status {
            400 => "Bad request".to_string(),
            401 => "Unauthorized".to_string(),
            403 => "Forbidden".to_string(),
            404 => "Not found".to_string(),
            408 => "Request timeout".to_string(),
            429 => "Too many requests".to_string(),
            _ => format!("HTTP {}", status),
        }
    } else {
        body.trim().to_string()
    };

    SessionError::Http(HttpError::Status { status, message })
}

/// Get user-friendly error message.
pub fn get_user_message(error: &SessionError) -> String {
    match error {
        SessionError::Token(_) => "Your session has expired. Please sign in again.".to_string(),
        SessionError::Resilience(ResilienceError::CircuitOpen { .. }) => {
            "The service is temporarily unavailable. Please try again shortly.".to_string()
        }
        SessionError::Network(NetworkError::Timeout { .. }) => {
            "The request timed out. Please check your connection and try again.".to_string()
        }
        SessionError::Network(_) => {
            "Unable to reach the server. Please check your connection.".to_string()
        }
        SessionError::Http(HttpError::Status { status: 429, .. }) => {
            "Too many requests. Please wait a moment and try again.".to_string()
        }
        SessionError::Http(HttpError::Status { status, .. }) if *status >= 500 => {
            "The server encountered an error. Please try again later.".to_string()
        }
        _ => "An unexpected error occurred. Please try again.".to_string(),
    }
}
