//! `strata run`

use anyhow::{Context, Result, bail};
use colored::*;
use std::path::Path;
use std::sync::Arc;
use strata_client::{IdentityClient, ProvisioningClient};
use strata_core::domain::run::RunStatus;
use strata_engine::definition::load_definition;
use strata_engine::executor::cancellation;
use strata_engine::{ExecutionMode, PipelineExecutor};
use tracing::warn;

use super::report::print_report;
use crate::config::Config;

pub async fn run(path: &Path, dry_run: bool, json: bool, config: &Config) -> Result<()> {
    let definition = load_definition(path).await?;
    let engine_config = config.engine_config()?;

    let identity = Arc::new(IdentityClient::new(
        engine_config.identity_url.clone(),
        engine_config.client_id.clone(),
    ));
    let backend = Arc::new(ProvisioningClient::new(
        engine_config.provisioning_url.clone(),
    ));

    let mode = if dry_run {
        ExecutionMode::DryRun
    } else {
        ExecutionMode::Apply
    };
    let executor = PipelineExecutor::from_config(&engine_config, identity, backend).with_mode(mode);

    let (trigger, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight stages");
            trigger.cancel();
        }
    });

    if !json {
        println!(
            "{} {}{}",
            "▸ Running".cyan().bold(),
            definition.name.bold(),
            if dry_run { " (dry run)".yellow() } else { "".normal() }
        );
    }

    let report = executor
        .execute(&definition, &signal)
        .await
        .with_context(|| format!("Run '{}' could not start", definition.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        println!(
            "  Stored in {}",
            engine_config
                .state_dir
                .join(format!("{}.json", report.run_id))
                .display()
                .to_string()
                .dimmed()
        );
    }

    if report.status != RunStatus::Succeeded {
        bail!("Run {} finished with status {}", report.run_id, report.status);
    }
    Ok(())
}
