//! Credential domain types
//!
//! Credentials are short-lived and only ever held in memory. They are
//! deliberately not serializable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Resource scope a token is requested for (e.g. "https://management.example.com/.default")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workload identity assertion supplied by the execution environment
#[derive(Clone, PartialEq, Eq)]
pub struct Assertion {
    /// Issuer of the assertion (e.g. the CI system's OIDC issuer)
    pub issuer: String,
    pub value: String,
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assertion")
            .field("issuer", &self.issuer)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Token as returned by the identity provider, before the broker stamps it
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub value: String,
    pub expires_in: Duration,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("value", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Scoped access token, immutable once issued
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub issuer: String,
    pub scope: Scope,
    token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        issuer: impl Into<String>,
        scope: Scope,
        token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            scope,
            token: token.into(),
            issued_at,
            expires_at,
        }
    }

    /// Raw bearer token value
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True if the token is still valid `horizon` after `now`
    pub fn valid_for(&self, now: DateTime<Utc>, horizon: Duration) -> bool {
        now + horizon < self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("issuer", &self.issuer)
            .field("scope", &self.scope)
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
