//! `strata rollout-plan`

use anyhow::{Context, Result, bail};
use colored::*;
use std::collections::BTreeMap;
use strata_engine::rollout::snapshots;

/// Parses a single `name=weight` pair
pub fn parse_weight(s: &str) -> Result<(String, u8)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid NAME=weight: no `=` found in `{}`", s))?;
    let weight = s[pos + 1..]
        .trim()
        .parse::<u8>()
        .with_context(|| format!("invalid weight in `{}`", s))?;
    Ok((s[..pos].trim().to_string(), weight))
}

pub fn rollout_plan(
    endpoint: &str,
    current: Vec<(String, u8)>,
    target: Vec<(String, u8)>,
    steps: u32,
) -> Result<()> {
    let current = weight_map("--current", current)?;
    let target = weight_map("--target", target)?;

    let planned = snapshots(endpoint, &current, &target, steps)?;

    if planned.is_empty() {
        println!("{}", "Endpoint is already at the target split.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Rollout of {} in {} step(s):", endpoint, planned.len()).bold()
    );
    for (i, snapshot) in planned.iter().enumerate() {
        println!("  {} {}", format!("{}.", i + 1).cyan(), snapshot);
    }

    Ok(())
}

/// Collects weights, refusing a deployment named twice
fn weight_map(flag: &str, pairs: Vec<(String, u8)>) -> Result<BTreeMap<String, u8>> {
    let mut weights = BTreeMap::new();
    for (name, weight) in pairs {
        if weights.insert(name.clone(), weight).is_some() {
            bail!("{} names deployment '{}' more than once", flag, name);
        }
    }
    Ok(weights)
}
