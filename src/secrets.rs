//! Redacted holder for the Hub access token.

use std::fmt;

/// A token string that never shows up in `Debug` or `Display` output.
///
/// ```
/// use message_decoding_r1::secrets::SecretString;
///
/// let token = SecretString::new("hf_abc123");
/// assert_eq!(format!("{token:?}"), "SecretString([REDACTED])");
/// assert_eq!(token.expose_secret(), "hf_abc123");
/// ```
#[derive(Clone)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: secret.into(),
        }
    }

    /// Returns `None` for a missing or blank value.
    pub fn from_option(secret: Option<impl Into<String>>) -> Option<Self> {
        secret
            .map(Self::new)
            .filter(|s| !s.expose_secret().trim().is_empty())
    }

    /// Only way to read the token. Do not log the result.
    #[inline]
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let token = SecretString::new("hf_super_secret");
        assert_eq!(format!("{token}"), "[REDACTED]");
        assert!(!format!("{token:?}").contains("hf_super_secret"));
    }

    #[test]
    fn test_blank_secret_is_dropped() {
        assert!(SecretString::from_option(Some("  ")).is_none());
        assert!(SecretString::from_option(None::<String>).is_none());
        assert!(SecretString::from_option(Some("hf_x")).is_some());
    }
}
