//! `strata report` and report rendering

use anyhow::Result;
use colored::*;
use strata_core::domain::log::{LogEntry, LogLevel};
use strata_core::domain::run::RunStatus;
use strata_core::domain::stage::StageStatus;
use strata_core::dto::run::{RunReport, StageReport};
use strata_engine::{FileRunStore, RunStore};
use uuid::Uuid;

use crate::config::Config;

pub async fn show_report(run_id: Uuid, json: bool, config: &Config) -> Result<()> {
    let store = FileRunStore::new(config.state_dir());
    let report = store.load(run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    if !report.events.is_empty() {
        println!("\n{}", "Events:".bold());
        println!("{}", "─".repeat(80).dimmed());
        for entry in &report.events {
            print_event(entry);
        }
        println!("{}", "─".repeat(80).dimmed());
    }
    Ok(())
}

pub fn print_report(report: &RunReport) {
    let status = match report.status {
        RunStatus::Succeeded => report.status.to_string().green().bold(),
        RunStatus::Failed => report.status.to_string().red().bold(),
        RunStatus::Cancelled => report.status.to_string().yellow().bold(),
        _ => report.status.to_string().normal(),
    };

    println!();
    println!("{}", "Run Details:".bold());
    println!("  ID:       {}", report.run_id.to_string().cyan());
    println!("  Name:     {}", report.name.bold());
    println!("  Status:   {}", status);
    if report.dry_run {
        println!("  Mode:     {}", "dry run".yellow());
    }
    println!(
        "  Started:  {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(completed) = report.completed_at {
        let elapsed = completed - report.started_at;
        println!(
            "  Duration: {}",
            format!("{}.{:03}s", elapsed.num_seconds(), elapsed.num_milliseconds() % 1000)
                .dimmed()
        );
    }
    if let Some(error) = &report.error {
        println!("  Error:    {}", error.red());
    }

    println!("\n{}", "Stages:".bold());
    for stage in &report.stages {
        print_stage(stage, report.dry_run);
    }
}

fn print_stage(stage: &StageReport, dry_run: bool) {
    let marker = match stage.status {
        StageStatus::Succeeded => "✓".green(),
        StageStatus::Failed => "✗".red(),
        StageStatus::Skipped => "-".yellow(),
        StageStatus::Pending | StageStatus::Running => "?".normal(),
    };

    let change = match (stage.status, stage.changed, dry_run) {
        (StageStatus::Succeeded, true, true) => "would change".yellow(),
        (StageStatus::Succeeded, true, false) => "changed".cyan(),
        (StageStatus::Succeeded, false, _) => "unchanged".dimmed(),
        _ => "".normal(),
    };

    println!(
        "  {} {} {} {}",
        marker,
        stage.name.bold(),
        format!("[{}]", stage.kind).dimmed(),
        change
    );
    if let Some(id) = &stage.resource_id {
        println!("      Resource: {}", id.to_string().dimmed());
    }
    if let Some(reason) = &stage.reason {
        println!(
            "      {}: {}",
            reason.red(),
            stage.error.as_deref().unwrap_or_default()
        );
    }
}

fn print_event(entry: &LogEntry) {
    let level = match entry.level {
        LogLevel::Debug => "DEBUG".dimmed(),
        LogLevel::Info => "INFO ".green(),
        LogLevel::Warning => "WARN ".yellow(),
        LogLevel::Error => "ERROR".red(),
    };
    let stage = entry
        .stage
        .as_deref()
        .map(|s| format!("[{}] ", s))
        .unwrap_or_default();

    println!(
        "{} {} {}{}",
        entry.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
        level,
        stage.cyan(),
        entry.message
    );
}
