//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod report;
mod rollout;
mod run;
mod validate;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Execute a run definition
    Run {
        /// Path to a .json or .toml run definition
        definition: PathBuf,

        /// Observe and diff every stage without applying anything
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Check a run definition and print its execution waves
    Validate {
        /// Path to a .json or .toml run definition
        definition: PathBuf,
    },
    /// Preview the traffic snapshots of a rollout, offline
    RolloutPlan {
        /// Endpoint name used in the output
        #[arg(long, default_value = "endpoint")]
        endpoint: String,

        /// Current weights (e.g. blue=100,green=0); empty for a new endpoint
        #[arg(long, value_parser = rollout::parse_weight, value_delimiter = ',')]
        current: Vec<(String, u8)>,

        /// Target weights (e.g. blue=50,green=50)
        #[arg(long, value_parser = rollout::parse_weight, value_delimiter = ',', required = true)]
        target: Vec<(String, u8)>,

        /// Number of snapshots
        #[arg(long, default_value = "1")]
        steps: u32,
    },
    /// Show a stored run report
    Report {
        run_id: Uuid,

        /// Print the report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run {
            definition,
            dry_run,
            json,
        } => run::run(&definition, dry_run, json, config).await,
        Commands::Validate { definition } => validate::validate(&definition).await,
        Commands::RolloutPlan {
            endpoint,
            current,
            target,
            steps,
        } => rollout::rollout_plan(&endpoint, current, target, steps),
        Commands::Report { run_id, json } => report::show_report(run_id, json, config).await,
    }
}
