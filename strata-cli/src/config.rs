//! Configuration module
//!
//! Command-line overrides on top of the engine's environment configuration.

use anyhow::Result;
use std::path::PathBuf;
use strata_core::domain::credential::Scope;
use strata_engine::EngineConfig;
use tracing::info;

/// CLI configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub identity_url: Option<String>,
    pub provisioning_url: Option<String>,
    pub scope: Option<String>,
    pub max_parallel_stages: Option<usize>,
    pub state_dir: Option<PathBuf>,
}

impl Config {
    /// Engine configuration from the environment with CLI overrides applied
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match EngineConfig::from_env() {
            Ok(config) => config,
            Err(e) => {
                info!("Incomplete environment configuration ({}), using defaults", e);
                EngineConfig::default()
            }
        };

        if let Some(url) = &self.identity_url {
            config.identity_url = url.clone();
        }
        if let Some(url) = &self.provisioning_url {
            config.provisioning_url = url.clone();
        }
        if let Some(scope) = &self.scope {
            config.default_scope = Scope::new(scope.clone());
        }
        if let Some(max) = self.max_parallel_stages {
            config.max_parallel_stages = max;
        }
        config.state_dir = self.state_dir();

        config.validate()?;
        Ok(config)
    }

    /// Where run reports are stored; needs no backend configuration
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .or_else(|| std::env::var("STRATA_STATE_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| EngineConfig::default().state_dir)
    }
}
