//! Credentials read from the process environment.

use std::fmt;

use crate::core::diagnostics::Redactor;

pub const ADVISOR_KEY_ENV: &str = "OPENAI_API_KEY";
pub const HOSTING_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// A credential value. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub advisor_key: Option<Secret>,
    pub hosting_token: Option<Secret>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary lookup; blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(Secret)
        };
        Self {
            advisor_key: read(ADVISOR_KEY_ENV),
            hosting_token: read(HOSTING_TOKEN_ENV),
        }
    }

    /// Redactor covering every known credential.
    pub fn redactor(&self) -> Redactor {
        Redactor::new(
            [&self.advisor_key, &self.hosting_token]
                .into_iter()
                .flatten()
                .map(|secret| secret.expose().to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_missing() {
        let secrets = Secrets::from_lookup(|name| match name {
            ADVISOR_KEY_ENV => Some("   ".to_string()),
            HOSTING_TOKEN_ENV => Some("ghp_0123456789abcdef".to_string()),
            _ => None,
        });
        assert!(secrets.advisor_key.is_none());
        assert_eq!(
            secrets.hosting_token.as_ref().map(Secret::expose),
            Some("ghp_0123456789abcdef")
        );
    }

    #[test]
    fn debug_output_hides_values() {
        let secrets = Secrets {
            advisor_key: Some(Secret::new("sk-live-0123456789")),
            hosting_token: None,
        };
        let debug = format!("{secrets:?}");
        assert!(!debug.contains("sk-live"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn redactor_covers_all_secrets() {
        let secrets = Secrets {
            advisor_key: Some(Secret::new("sk-live-0123456789")),
            hosting_token: Some(Secret::new("ghp_0123456789abcdef")),
        };
        let text = secrets
            .redactor()
            .redact("key=sk-live-0123456789 token=ghp_0123456789abcdef");
        assert_eq!(text, "key=[REDACTED] token=[REDACTED]");
    }
}
