//! Credential broker
//!
//! Exchanges the workload identity assertion provided by the execution
//! environment for a short-lived, scoped access token and keeps it in memory
//! for the duration of one run. Nothing here is ever written to disk.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strata_core::backend::IdentityProvider;
use strata_core::domain::credential::{Assertion, Credential, Scope};
use strata_core::error::{AuthError, AuthFailure};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AssertionConfig;

/// Supplies the identity assertion presented to the identity provider
#[async_trait]
pub trait AssertionSource: Send + Sync {
    async fn assertion(&self) -> Result<Assertion, AuthError>;
}

/// Reads the assertion from an environment variable on every call
pub struct EnvAssertionSource {
    var: String,
    issuer: String,
}

impl EnvAssertionSource {
    pub fn new(var: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            issuer: issuer.into(),
        }
    }
}

#[async_trait]
impl AssertionSource for EnvAssertionSource {
    async fn assertion(&self) -> Result<Assertion, AuthError> {
        let value = std::env::var(&self.var).map_err(|_| {
            AuthError::new(
                AuthFailure::AssertionRejected,
                format!("no identity assertion in ${}", self.var),
            )
        })?;

        Ok(Assertion {
            issuer: self.issuer.clone(),
            value: value.trim().to_string(),
        })
    }
}

/// Reads the assertion from a file the platform keeps rotated
pub struct FileAssertionSource {
    path: PathBuf,
    issuer: String,
}

impl FileAssertionSource {
    pub fn new(path: impl Into<PathBuf>, issuer: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            issuer: issuer.into(),
        }
    }
}

#[async_trait]
impl AssertionSource for FileAssertionSource {
    async fn assertion(&self) -> Result<Assertion, AuthError> {
        // Re-read on every exchange: projected token files rotate underneath us
        let value = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AuthError::new(
                AuthFailure::AssertionRejected,
                format!("cannot read assertion file {}: {}", self.path.display(), e),
            )
        })?;

        Ok(Assertion {
            issuer: self.issuer.clone(),
            value: value.trim().to_string(),
        })
    }
}

/// Builds the assertion source described by the configuration
pub fn assertion_source(config: &AssertionConfig, issuer: &str) -> Arc<dyn AssertionSource> {
    match config {
        AssertionConfig::Env(var) => Arc::new(EnvAssertionSource::new(var.clone(), issuer)),
        AssertionConfig::File(path) => Arc::new(FileAssertionSource::new(path.clone(), issuer)),
    }
}

/// Caches scoped credentials for one run and refreshes them before expiry
pub struct CredentialBroker {
    provider: Arc<dyn IdentityProvider>,
    assertions: Arc<dyn AssertionSource>,
    /// Minimum remaining lifetime of a credential handed to a caller
    horizon: Duration,
    cache: Mutex<HashMap<Scope, Credential>>,
    exchanges: AtomicU64,
}

impl CredentialBroker {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        assertions: Arc<dyn AssertionSource>,
        horizon: Duration,
    ) -> Self {
        Self {
            provider,
            assertions,
            horizon,
            cache: Mutex::new(HashMap::new()),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Returns a credential for `scope` that stays valid past the horizon
    ///
    /// A cached credential is reused when possible; otherwise the assertion is
    /// exchanged again. Errors are never retried here.
    pub async fn acquire(&self, scope: &Scope) -> Result<Credential, AuthError> {
        self.acquire_for(scope, self.horizon).await
    }

    /// Same as [`acquire`](Self::acquire) with an explicit horizon
    pub async fn acquire_for(
        &self,
        scope: &Scope,
        horizon: Duration,
    ) -> Result<Credential, AuthError> {
        let horizon = chrono::Duration::from_std(horizon).unwrap_or(chrono::Duration::days(1));
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.get(scope) {
            if cached.valid_for(Utc::now(), horizon) {
                debug!("Reusing cached credential for scope {}", scope);
                return Ok(cached.clone());
            }
            info!(
                "Credential for scope {} expires at {}, refreshing",
                scope, cached.expires_at
            );
        }

        let assertion = self.assertions.assertion().await?;
        let issued = self.provider.exchange(&assertion, scope).await?;
        self.exchanges.fetch_add(1, Ordering::Relaxed);

        let issued_at = Utc::now();
        let credential = Credential::new(
            assertion.issuer,
            scope.clone(),
            issued.value,
            issued_at,
            issued_at + issued.expires_in,
        );

        if !credential.valid_for(issued_at, horizon) {
            warn!(
                "Identity provider issued a token for {} valid only until {}, shorter than the refresh horizon",
                scope, credential.expires_at
            );
        }

        info!(
            "Acquired credential for scope {} (expires {})",
            scope, credential.expires_at
        );

        cache.insert(scope.clone(), credential.clone());
        Ok(credential)
    }

    /// Number of successful exchanges performed so far
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }
}
