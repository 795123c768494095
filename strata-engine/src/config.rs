//! Engine configuration
//!
//! Defines all configurable parameters of a pipeline run: where the identity
//! provider and the provisioning backend live, how many stages may run at
//! once, call deadlines, token refresh margin, retry policy and the audit
//! directory.

use std::path::PathBuf;
use std::time::Duration;

use strata_core::domain::credential::Scope;

use crate::retry::RetryPolicy;

/// Where the workload identity assertion comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionConfig {
    /// Assertion value held in an environment variable
    Env(String),
    /// Assertion written to a file by the platform (projected token file)
    File(PathBuf),
}

/// Engine configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (dev vs prod, fast vs slow backends).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Token endpoint of the identity provider
    pub identity_url: String,

    /// Client id the federated credential is registered on
    pub client_id: String,

    /// Source of the identity assertion
    pub assertion: AssertionConfig,

    /// Issuer recorded on credentials (informational)
    pub assertion_issuer: String,

    /// Provisioning backend base URL (e.g., "http://localhost:8080")
    pub provisioning_url: String,

    /// Scope requested when the run definition does not name one
    pub default_scope: Scope,

    /// Max stages of one wave dispatched at the same time
    pub max_parallel_stages: usize,

    /// Deadline of each backend call and each rollout commit
    pub call_timeout: Duration,

    /// Tokens expiring within this margin (plus the call timeout) are refreshed
    pub refresh_margin: Duration,

    /// Call-level retry of retryable backend errors inside one reconcile
    pub retry: RetryPolicy,

    /// Pause between two committed rollout steps
    pub rollout_step_interval: Duration,

    /// Directory where run reports are stored for audit
    pub state_dir: PathBuf,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    pub fn new(identity_url: String, provisioning_url: String) -> Self {
        Self {
            identity_url,
            client_id: String::new(),
            assertion: AssertionConfig::Env("STRATA_ID_TOKEN".to_string()),
            assertion_issuer: "ci".to_string(),
            provisioning_url,
            default_scope: Scope::new("https://management.azure.com/.default"),
            max_parallel_stages: 4,
            call_timeout: Duration::from_secs(120),
            refresh_margin: Duration::from_secs(300), // 5 minutes
            retry: RetryPolicy::default(),
            rollout_step_interval: Duration::from_secs(0),
            state_dir: PathBuf::from(".strata/runs"),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - STRATA_IDENTITY_URL (required)
    /// - STRATA_PROVISIONING_URL (required)
    /// - STRATA_CLIENT_ID (optional, default: empty)
    /// - STRATA_ASSERTION_FILE (optional, path; takes precedence over STRATA_ASSERTION_ENV)
    /// - STRATA_ASSERTION_ENV (optional, variable name, default: STRATA_ID_TOKEN)
    /// - STRATA_ASSERTION_ISSUER (optional, default: ci)
    /// - STRATA_SCOPE (optional)
    /// - STRATA_MAX_PARALLEL_STAGES (optional, default: 4)
    /// - STRATA_CALL_TIMEOUT (optional, seconds, default: 120)
    /// - STRATA_REFRESH_MARGIN (optional, seconds, default: 300)
    /// - STRATA_RETRY_MAX_ATTEMPTS (optional, default: 1)
    /// - STRATA_RETRY_INITIAL_DELAY_MS (optional, default: 500)
    /// - STRATA_RETRY_MAX_DELAY_MS (optional, default: 30000)
    /// - STRATA_ROLLOUT_STEP_INTERVAL (optional, seconds, default: 0)
    /// - STRATA_STATE_DIR (optional, default: .strata/runs)
    pub fn from_env() -> anyhow::Result<Self> {
        let identity_url = std::env::var("STRATA_IDENTITY_URL")
            .map_err(|_| anyhow::anyhow!("STRATA_IDENTITY_URL environment variable not set"))?;

        let provisioning_url = std::env::var("STRATA_PROVISIONING_URL").map_err(|_| {
            anyhow::anyhow!("STRATA_PROVISIONING_URL environment variable not set")
        })?;

        let mut config = Self::new(identity_url, provisioning_url);

        if let Ok(client_id) = std::env::var("STRATA_CLIENT_ID") {
            config.client_id = client_id;
        }

        if let Ok(path) = std::env::var("STRATA_ASSERTION_FILE") {
            config.assertion = AssertionConfig::File(PathBuf::from(path));
        } else if let Ok(var) = std::env::var("STRATA_ASSERTION_ENV") {
            config.assertion = AssertionConfig::Env(var);
        }

        if let Ok(issuer) = std::env::var("STRATA_ASSERTION_ISSUER") {
            config.assertion_issuer = issuer;
        }

        if let Ok(scope) = std::env::var("STRATA_SCOPE") {
            config.default_scope = Scope::new(scope);
        }

        config.max_parallel_stages = env_parse("STRATA_MAX_PARALLEL_STAGES")
            .unwrap_or(config.max_parallel_stages);

        config.call_timeout = env_parse("STRATA_CALL_TIMEOUT")
            .map(Duration::from_secs)
            .unwrap_or(config.call_timeout);

        config.refresh_margin = env_parse("STRATA_REFRESH_MARGIN")
            .map(Duration::from_secs)
            .unwrap_or(config.refresh_margin);

        config.retry = RetryPolicy {
            max_attempts: env_parse("STRATA_RETRY_MAX_ATTEMPTS")
                .unwrap_or(config.retry.max_attempts),
            initial_delay: env_parse("STRATA_RETRY_INITIAL_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(config.retry.initial_delay),
            max_delay: env_parse("STRATA_RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(config.retry.max_delay),
        };

        config.rollout_step_interval = env_parse("STRATA_ROLLOUT_STEP_INTERVAL")
            .map(Duration::from_secs)
            .unwrap_or(config.rollout_step_interval);

        if let Ok(dir) = std::env::var("STRATA_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [
            ("identity_url", &self.identity_url),
            ("provisioning_url", &self.provisioning_url),
        ] {
            if url.is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }

            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must start with http:// or https://", name);
            }
        }

        if self.default_scope.as_str().is_empty() {
            anyhow::bail!("default_scope cannot be empty");
        }

        if self.max_parallel_stages == 0 {
            anyhow::bail!("max_parallel_stages must be greater than 0");
        }

        if self.call_timeout.is_zero() {
            anyhow::bail!("call_timeout must be greater than 0");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        if self.retry.initial_delay > self.retry.max_delay {
            anyhow::bail!("retry.initial_delay cannot exceed retry.max_delay");
        }

        Ok(())
    }

    /// How long a credential must stay valid to be handed to a wave
    pub fn credential_horizon(&self) -> Duration {
        self.refresh_margin + self.call_timeout
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(
            "http://localhost:8081/token".to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}
