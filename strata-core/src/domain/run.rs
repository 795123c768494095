//! Run domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::stage::{SkipReason, Stage, StageDefinition, StageStatus};

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initializing,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Initializing => write!(f, "Initializing"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Succeeded => write!(f, "Succeeded"),
            RunStatus::Failed => write!(f, "Failed"),
            RunStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One execution of a run definition
///
/// Owns every stage record of the execution. Stages live in a flat map keyed
/// by name; `order` keeps the deterministic topological order for reporting.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: Uuid,
    pub name: String,
    pub status: RunStatus,
    pub stages: BTreeMap<String, Stage>,
    pub order: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// First run-level error, if any
    pub error: Option<String>,
}

impl Run {
    /// Creates a run in `Initializing` state
    ///
    /// `order` must name every definition exactly once.
    pub fn new(name: impl Into<String>, definitions: Vec<StageDefinition>, order: Vec<String>) -> Self {
        let stages = definitions
            .into_iter()
            .map(|def| (def.name.clone(), Stage::new(def)))
            .collect();

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: RunStatus::Initializing,
            stages,
            order,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut Stage> {
        self.stages.get_mut(name)
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.values().filter(|s| s.status == status).count()
    }

    /// Marks every still-pending stage skipped and returns their names
    pub fn skip_pending(&mut self, reason: SkipReason) -> Vec<String> {
        self.stages
            .values_mut()
            .filter_map(|stage| {
                if stage.skip(reason.clone()) {
                    Some(stage.name().to_string())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Computes the terminal status once no further progress is possible
    ///
    /// Any failed stage or run-level error makes the run `Failed`. Otherwise a
    /// stage skipped by cancellation makes it `Cancelled`. Only a run whose
    /// stages all succeeded is `Succeeded`.
    pub fn finish(&mut self) -> RunStatus {
        let failed = self.count(StageStatus::Failed) > 0 || self.error.is_some();
        let cancelled = self
            .stages
            .values()
            .any(|s| s.skip_reason == Some(SkipReason::Cancelled));

        self.status = if failed {
            RunStatus::Failed
        } else if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Succeeded
        };
        self.completed_at = Some(Utc::now());
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceDescriptor;
    use crate::error::ReconcileError;

    fn run(names: &[&str]) -> Run {
        let defs = names
            .iter()
            .map(|n| StageDefinition::reconcile(*n, ResourceDescriptor::new("compute", *n)))
            .collect();
        Run::new(
            "test",
            defs,
            names.iter().map(|n| n.to_string()).collect(),
        )
    }

    #[test]
    fn test_all_succeeded_is_succeeded() {
        let mut run = run(&["a", "b"]);
        for stage in run.stages.values_mut() {
            stage.start();
            stage.succeed(false, None);
        }
        assert_eq!(run.finish(), RunStatus::Succeeded);
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_failure_wins_over_skip() {
        let mut run = run(&["a", "b"]);
        run.stage_mut("a")
            .unwrap()
            .fail(ReconcileError::invalid("bad").into());
        run.skip_pending(SkipReason::Cancelled);
        assert_eq!(run.finish(), RunStatus::Failed);
    }

    #[test]
    fn test_cancelled_without_failure() {
        let mut run = run(&["a", "b"]);
        run.stage_mut("a").unwrap().succeed(true, None);
        let skipped = run.skip_pending(SkipReason::Cancelled);
        assert_eq!(skipped, vec!["b".to_string()]);
        assert_eq!(run.finish(), RunStatus::Cancelled);
    }
}
