//! Strata CLI
//!
//! Runs staged provisioning definitions and inspects their results.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Staged ML platform provisioning", long_about = None)]
struct Cli {
    /// Token endpoint of the identity provider
    #[arg(long, env = "STRATA_IDENTITY_URL")]
    identity_url: Option<String>,

    /// Provisioning backend URL
    #[arg(long, env = "STRATA_PROVISIONING_URL")]
    provisioning_url: Option<String>,

    /// Scope requested when the definition does not name one
    #[arg(long, env = "STRATA_SCOPE")]
    scope: Option<String>,

    /// Max stages of one wave running at once
    #[arg(long, env = "STRATA_MAX_PARALLEL_STAGES")]
    max_parallel_stages: Option<usize>,

    /// Directory holding stored run reports
    #[arg(long, env = "STRATA_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_cli=info,strata_engine=info,strata_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        identity_url: cli.identity_url,
        provisioning_url: cli.provisioning_url,
        scope: cli.scope,
        max_parallel_stages: cli.max_parallel_stages,
        state_dir: cli.state_dir,
    };

    handle_command(cli.command, &config).await
}
