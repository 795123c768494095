//! Run definition loading
//!
//! Definitions are JSON or TOML documents; the format is picked from the
//! file extension.

use anyhow::{Context, Result, bail};
use std::path::Path;
use strata_core::dto::run::RunDefinition;

/// Supported definition formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Toml,
}

impl DefinitionFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(DefinitionFormat::Json),
            Some("toml") => Ok(DefinitionFormat::Toml),
            _ => bail!(
                "Cannot tell the format of {} (expected .json or .toml)",
                path.display()
            ),
        }
    }
}

pub fn parse_definition(source: &str, format: DefinitionFormat) -> Result<RunDefinition> {
    let definition: RunDefinition = match format {
        DefinitionFormat::Json => {
            serde_json::from_str(source).context("Invalid JSON run definition")?
        }
        DefinitionFormat::Toml => toml::from_str(source).context("Invalid TOML run definition")?,
    };

    if definition.stages.is_empty() {
        bail!("Run definition '{}' has no stages", definition.name);
    }

    Ok(definition)
}

pub async fn load_definition(path: &Path) -> Result<RunDefinition> {
    let format = DefinitionFormat::from_path(path)?;
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_definition(&source, format).with_context(|| format!("Failed to load {}", path.display()))
}
