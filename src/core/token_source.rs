//! Token Source
//!
//! Where the current bearer token is read from (a cookie jar, key-value
//! store or keychain in a real client).

use parking_lot::RwLock;
use secrecy::SecretString;

/// Token source interface.
pub trait TokenSource: Send + Sync {
    /// Current bearer token, if one is stored.
    fn current_token(&self) -> Option<SecretString>;
}

/// In-memory token source.
#[derive(Default)]
pub struct InMemoryTokenSource {
    token: RwLock<Option<SecretString>>,
}

impl InMemoryTokenSource {
    /// Create an empty token source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token source holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let source = Self::new();
        source.set_token(token);
        source
    }

    /// Replace the stored token.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(SecretString::new(token.into()));
    }

    /// Remove the stored token.
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl TokenSource for InMemoryTokenSource {
    fn current_token(&self) -> Option<SecretString> {
        self.token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_set_and_clear() {
        let source = InMemoryTokenSource::new();
        assert!(source.current_token().is_none());

        source.set_token("abc");
        assert_eq!(source.current_token().unwrap().expose_secret(), "abc");

        source.clear();
        assert!(source.current_token().is_none());
    }

    #[test]
    fn test_with_token() {
        let source = InMemoryTokenSource::with_token("xyz");
        assert_eq!(source.current_token().unwrap().expose_secret(), "xyz");
    }
}
