//! Stage domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::resource::{ResourceDescriptor, ResourceId};
use crate::domain::rollout::RolloutSpec;
use crate::error::StageError;

/// What a stage does when dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Reconcile,
    Rollout,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Reconcile => write!(f, "reconcile"),
            StageKind::Rollout => write!(f, "rollout"),
        }
    }
}

/// Kind-specific desired state of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageAction {
    Reconcile { resource: ResourceDescriptor },
    Rollout { rollout: RolloutSpec },
}

impl StageAction {
    pub fn kind(&self) -> StageKind {
        match self {
            StageAction::Reconcile { .. } => StageKind::Reconcile,
            StageAction::Rollout { .. } => StageKind::Rollout,
        }
    }
}

/// Stage as declared in a run definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    #[serde(flatten)]
    pub action: StageAction,
}

impl StageDefinition {
    pub fn reconcile(name: impl Into<String>, resource: ResourceDescriptor) -> Self {
        Self {
            name: name.into(),
            depends_on: BTreeSet::new(),
            action: StageAction::Reconcile { resource },
        }
    }

    pub fn rollout(name: impl Into<String>, rollout: RolloutSpec) -> Self {
        Self {
            name: name.into(),
            depends_on: BTreeSet::new(),
            action: StageAction::Rollout { rollout },
        }
    }

    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.insert(dependency.into());
        self
    }

    pub fn kind(&self) -> StageKind {
        self.action.kind()
    }
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "Pending"),
            StageStatus::Running => write!(f, "Running"),
            StageStatus::Succeeded => write!(f, "Succeeded"),
            StageStatus::Failed => write!(f, "Failed"),
            StageStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Why a stage never ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A (possibly transitive) dependency failed
    DependencyFailed { dependency: String },
    /// The run was cancelled before the stage was dispatched
    Cancelled,
    /// A run-level error stopped dispatching
    RunAborted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency '{}' failed", dependency)
            }
            SkipReason::Cancelled => write!(f, "run cancelled"),
            SkipReason::RunAborted => write!(f, "run aborted"),
        }
    }
}

/// In-memory stage record owned by a run
#[derive(Debug, Clone)]
pub struct Stage {
    pub definition: StageDefinition,
    pub status: StageStatus,
    pub changed: bool,
    pub resource_id: Option<ResourceId>,
    pub error: Option<StageError>,
    pub skip_reason: Option<SkipReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Stage {
    pub fn new(definition: StageDefinition) -> Self {
        Self {
            definition,
            status: StageStatus::Pending,
            changed: false,
            resource_id: None,
            error: None,
            skip_reason: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn start(&mut self) {
        self.status = StageStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self, changed: bool, resource_id: Option<ResourceId>) {
        self.status = StageStatus::Succeeded;
        self.changed = changed;
        self.resource_id = resource_id;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: StageError) {
        self.status = StageStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Only a pending stage can be skipped; returns whether it was
    pub fn skip(&mut self, reason: SkipReason) -> bool {
        if self.status != StageStatus::Pending {
            return false;
        }
        self.status = StageStatus::Skipped;
        self.skip_reason = Some(reason);
        self.completed_at = Some(Utc::now());
        true
    }
}
