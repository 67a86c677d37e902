//! Token Types
//!
//! Claims carried by a bearer token.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoded bearer token claims.
///
/// Derived from the token string on demand and never persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Any other claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenClaims {
    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Issued-at as a timestamp.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Check if the token is expired at `now`.
    ///
    /// Claims without a usable expiry count as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| exp <= now).unwrap_or(true)
    }

    /// Remaining lifetime at `now`, zero once expired.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.expires_at().map(|exp| {
            if exp > now {
                exp - now
            } else {
                chrono::Duration::zero()
            }
        })
    }

    /// Get an extra claim by name.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}
