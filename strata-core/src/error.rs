//! Error taxonomy shared by every Strata component
//!
//! Run-level errors (`AuthError`, `GraphError`) abort a run before any stage
//! executes. Stage-level errors (`ReconcileError`, `WeightError`) only
//! propagate along dependency edges.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a token exchange failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthFailure {
    IssuerUnreachable,
    AssertionRejected,
    ScopeDenied,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::IssuerUnreachable => write!(f, "issuer-unreachable"),
            AuthFailure::AssertionRejected => write!(f, "assertion-rejected"),
            AuthFailure::ScopeDenied => write!(f, "scope-denied"),
        }
    }
}

/// Credential acquisition failed. Always fatal for the current run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("authentication failed ({reason}): {message}")]
pub struct AuthError {
    pub reason: AuthFailure,
    pub message: String,
}

impl AuthError {
    pub fn new(reason: AuthFailure, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Declared dependencies do not form a DAG
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("dependency cycle detected: {}", cycle.join(" -> "))]
pub struct CycleError {
    /// Stage names along the cycle, first element repeated at the end
    pub cycle: Vec<String>,
}

/// Failure to turn stage definitions into an executable graph
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("stage '{0}' is defined more than once")]
    DuplicateStage(String),

    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },

    #[error("stage names cannot be empty")]
    EmptyName,
}

/// Why a reconciliation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileFailure {
    /// Concurrent external modification
    Conflict,
    QuotaExceeded,
    /// Backend not reachable or the call ran past its deadline
    BackendUnreachable,
    InvalidDesiredState,
    /// Backend refused the presented token
    Unauthorized,
}

impl ReconcileFailure {
    /// Whether re-invoking the run may succeed without changing the definition
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileFailure::Conflict | ReconcileFailure::BackendUnreachable
        )
    }
}

impl std::fmt::Display for ReconcileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileFailure::Conflict => write!(f, "conflict"),
            ReconcileFailure::QuotaExceeded => write!(f, "quota-exceeded"),
            ReconcileFailure::BackendUnreachable => write!(f, "backend-unreachable"),
            ReconcileFailure::InvalidDesiredState => write!(f, "invalid-desired-state"),
            ReconcileFailure::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// Reconciliation of a single resource failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("reconcile failed ({reason}): {message}")]
pub struct ReconcileError {
    pub reason: ReconcileFailure,
    pub message: String,
}

impl ReconcileError {
    pub fn new(reason: ReconcileFailure, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ReconcileFailure::Conflict, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ReconcileFailure::BackendUnreachable, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ReconcileFailure::InvalidDesiredState, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.reason.is_retryable()
    }
}

/// Why a rollout request was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightFailure {
    /// Weights sum to something other than 100
    InvalidSum { found: u32 },
    UnknownTarget { name: String },
    InvalidStepCount,
    RolloutInProgress,
}

impl std::fmt::Display for WeightFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightFailure::InvalidSum { found } => {
                write!(f, "weights must sum to 100 (found {})", found)
            }
            WeightFailure::UnknownTarget { name } => write!(f, "unknown target '{}'", name),
            WeightFailure::InvalidStepCount => write!(f, "step count must be at least 1"),
            WeightFailure::RolloutInProgress => write!(f, "rollout-in-progress"),
        }
    }
}

/// Rollout request was invalid or collided with an in-flight rollout
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("rollout refused for endpoint '{endpoint}': {reason}")]
pub struct WeightError {
    pub endpoint: String,
    pub reason: WeightFailure,
}

impl WeightError {
    pub fn new(endpoint: impl Into<String>, reason: WeightFailure) -> Self {
        Self {
            endpoint: endpoint.into(),
            reason,
        }
    }
}

/// Terminal error recorded against a stage
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Weight(#[from] WeightError),

    /// Credential refresh failed while the stage was running
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("stage task aborted: {0}")]
    Internal(String),
}

impl StageError {
    /// Short machine-readable reason used in run reports
    pub fn reason(&self) -> String {
        match self {
            StageError::Reconcile(e) => e.reason.to_string(),
            StageError::Weight(e) => match e.reason {
                WeightFailure::RolloutInProgress => "rollout-in-progress".to_string(),
                _ => "invalid-weights".to_string(),
            },
            StageError::Auth(e) => e.reason.to_string(),
            StageError::Internal(_) => "internal".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::Reconcile(e) => e.is_retryable(),
            StageError::Weight(_) | StageError::Auth(_) | StageError::Internal(_) => false,
        }
    }
}
