//! Run definition (input) and run report (output) DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::credential::Scope;
use crate::domain::log::LogEntry;
use crate::domain::resource::ResourceId;
use crate::domain::run::{Run, RunStatus};
use crate::domain::stage::{StageDefinition, StageKind, StageStatus};

/// Run definition supplied by an external caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefinition {
    pub name: String,
    /// Scope requested from the identity provider; falls back to the engine default
    #[serde(default)]
    pub scope: Option<Scope>,
    pub stages: Vec<StageDefinition>,
}

/// Final state of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub name: String,
    pub kind: StageKind,
    pub status: StageStatus,
    pub changed: bool,
    pub resource_id: Option<ResourceId>,
    /// Machine-readable reason for non-succeeded stages
    pub reason: Option<String>,
    /// Human-readable error detail
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Audit record of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub name: String,
    pub status: RunStatus,
    #[serde(default)]
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub stages: Vec<StageReport>,
    #[serde(default)]
    pub events: Vec<LogEntry>,
}

impl RunReport {
    /// Builds a report from a finished run, stages in topological order
    pub fn from_run(run: &Run, events: Vec<LogEntry>) -> Self {
        let stages = run
            .order
            .iter()
            .filter_map(|name| run.stage(name))
            .map(|stage| {
                let (reason, error) = match (&stage.error, &stage.skip_reason) {
                    (Some(err), _) => (Some(err.reason()), Some(err.to_string())),
                    (None, Some(skip)) => (Some("skipped".to_string()), Some(skip.to_string())),
                    (None, None) => (None, None),
                };
                StageReport {
                    name: stage.name().to_string(),
                    kind: stage.definition.kind(),
                    status: stage.status,
                    changed: stage.changed,
                    resource_id: stage.resource_id.clone(),
                    reason,
                    error,
                    started_at: stage.started_at,
                    completed_at: stage.completed_at,
                }
            })
            .collect();

        Self {
            run_id: run.id,
            name: run.name.clone(),
            status: run.status,
            dry_run: false,
            started_at: run.started_at,
            completed_at: run.completed_at,
            error: run.error.clone(),
            stages,
            events,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }
}
