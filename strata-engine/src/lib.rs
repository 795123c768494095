//! Strata engine
//!
//! Orchestrates staged provisioning runs against a provisioning backend.
//!
//! Architecture:
//! - Credential broker: federated token exchange, cached per scope for one run
//! - Stage graph: dependency DAG with deterministic wave order
//! - Resource reconciler: observe, diff and apply only the delta
//! - Rollout controller: stepwise traffic shifting between deployments
//! - Pipeline executor: wave dispatch, skip cascade, cancellation, audit
//!
//! The identity provider and the provisioning backend are reached through the
//! traits in `strata_core::backend`; `strata-client` provides HTTP versions.

pub mod config;
pub mod credential;
pub mod definition;
pub mod executor;
pub mod graph;
pub mod reconciler;
pub mod retry;
pub mod rollout;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::{AssertionConfig, EngineConfig};
pub use credential::CredentialBroker;
pub use executor::{CancelSignal, CancelTrigger, ExecutionMode, PipelineExecutor, RunError};
pub use graph::StageGraph;
pub use reconciler::{BackendReconciler, ResourceReconciler};
pub use retry::RetryPolicy;
pub use rollout::RolloutController;
pub use store::{FileRunStore, RunStore};
