//! Bearer Token Decoding
//!
//! Reads the claims segment of a JWT without verifying its signature. The
//! result is only used to decide when to refresh; the server remains the
//! authority on validity.

use base64::Engine;
use chrono::{DateTime, Utc};

use crate::error::TokenError;
use crate::types::TokenClaims;

const BEARER_PREFIX: &str = "Bearer ";

/// Decode the claims of a bearer token.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let token = token.trim();
    let token = token.strip_prefix(BEARER_PREFIX).unwrap_or(token).trim();

    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(header), Some(payload), Some(_signature))
            if !header.is_empty() && !payload.is_empty() =>
        {
            payload
        }
        _ => {
            return Err(TokenError::Malformed {
                message: "expected three dot-separated segments".to_string(),
            })
        }
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenError::Malformed {
            message: format!("invalid base64 payload: {}", e),
        })?;

    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed {
        message: format!("invalid claims JSON: {}", e),
    })
}

/// Decode only the expiry of a bearer token.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    decode_claims(token)?
        .expires_at()
        .ok_or(TokenError::MissingExpiry)
}

/// Build an unsigned token carrying `claims`, for tests and fixtures.
pub fn encode_unsigned(claims: &TokenClaims) -> serde_json::Result<String> {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = engine.encode(serde_json::to_vec(claims)?);
    Ok(format!("{}.{}.", header, payload))
}
