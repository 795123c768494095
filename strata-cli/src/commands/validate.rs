//! `strata validate`

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use strata_core::domain::stage::StageAction;
use strata_engine::StageGraph;
use strata_engine::definition::load_definition;
use strata_engine::reconciler::validate as validate_resource;
use strata_engine::rollout::snapshots;

pub async fn validate(path: &Path) -> Result<()> {
    let definition = load_definition(path).await?;
    let graph = StageGraph::build(&definition.stages)
        .with_context(|| format!("Invalid stage graph in {}", path.display()))?;

    for stage in &definition.stages {
        match &stage.action {
            StageAction::Reconcile { resource } => validate_resource(resource)
                .with_context(|| format!("Stage '{}' is invalid", stage.name))?,
            StageAction::Rollout { rollout } => {
                // Target-only check: the live split is unknown offline
                snapshots(&rollout.endpoint, &Default::default(), &rollout.targets, rollout.steps)
                    .map(|_| ())
                    .with_context(|| format!("Stage '{}' is invalid", stage.name))?
            }
        }
    }

    println!("{}", "✓ Run definition is valid".green().bold());
    println!("  Name:   {}", definition.name.bold());
    if let Some(scope) = &definition.scope {
        println!("  Scope:  {}", scope.to_string().dimmed());
    }
    println!("  Stages: {}", graph.len());

    println!("\n{}", "Waves:".bold());
    for (i, wave) in graph.waves().iter().enumerate() {
        println!("  {} {}", format!("{}.", i + 1).cyan(), wave.join(", "));
    }

    println!("\n{}", "Order:".bold());
    for name in graph.topological_order() {
        match graph.dependencies_of(&name) {
            Some(deps) if !deps.is_empty() => {
                let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                println!("  {} {}", name, format!("(after {})", deps.join(", ")).dimmed());
            }
            _ => println!("  {}", name),
        }
    }

    Ok(())
}
