use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credential string that never shows up in logs.
///
/// `Debug` and `Display` print `[REDACTED]`. The buffer is zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read-only access for signing. Do not log or persist the result.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Consumer credentials of the application issuing requests.
#[derive(Debug, Clone)]
pub struct OAuthClientApp {
    consumer_key: String,
    consumer_secret: SecretString,
}

impl OAuthClientApp {
    #[must_use]
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<SecretString>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    #[must_use]
    pub fn consumer_secret(&self) -> &SecretString {
        &self.consumer_secret
    }
}

/// Access token of the user a request is made for.
///
/// Either field may be missing. A user without a token is treated like no
/// user at all and requests are signed with the consumer credentials only.
#[derive(Debug, Clone, Default)]
pub struct OAuthUser {
    token: Option<String>,
    token_secret: Option<SecretString>,
}

impl OAuthUser {
    #[must_use]
    pub fn new(token: impl Into<String>, token_secret: impl Into<SecretString>) -> Self {
        Self {
            token: Some(token.into()),
            token_secret: Some(token_secret.into()),
        }
    }

    /// User with possibly absent credentials.
    #[must_use]
    pub fn from_parts(token: Option<String>, token_secret: Option<SecretString>) -> Self {
        Self {
            token,
            token_secret,
        }
    }

    /// Token, when present and non-empty.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    #[must_use]
    pub fn token_secret(&self) -> Option<&SecretString> {
        self.token_secret.as_ref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn secret_is_redacted() {
        let s = SecretString::new("hunter2");
        assert_eq!(format!("{s:?}"), "[REDACTED]");
        assert_eq!(format!("{s}"), "[REDACTED]");
        assert_eq!(s.expose(), "hunter2");
    }

    #[test]
    fn zeroize_clears_buffer() {
        let mut s = SecretString::new("sensitive");
        s.zeroize();
        assert!(s.is_empty());
    }

    #[test]
    fn app_debug_hides_secret() {
        let app = OAuthClientApp::new("consumer-key", "consumer-secret");
        let dbg = format!("{app:?}");
        assert!(dbg.contains("consumer-key"));
        assert!(!dbg.contains("consumer-secret"));
    }

    #[test]
    fn empty_user_fields_are_absent() {
        let user = OAuthUser::from_parts(Some(String::new()), Some(SecretString::new("")));
        assert_eq!(user.token(), None);
        assert!(user.token_secret().is_none());

        let user = OAuthUser::default();
        assert_eq!(user.token(), None);
    }
}
