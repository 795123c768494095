//! Pipeline executor
//!
//! Drives a run definition to a terminal state. The stage graph is walked
//! wave by wave: every ready stage of a wave is dispatched concurrently
//! (bounded by `max_parallel_stages`) and the next wave is only computed once
//! the whole wave has finished. A failed stage skips its transitive
//! dependents while independent branches keep running. No stage runs twice
//! inside a run; re-invoking the run is the retry.

mod cancel;
mod events;

pub use cancel::{CancelSignal, CancelTrigger, cancellation};
pub use events::{EventSink, InMemoryEventLog};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use strata_core::backend::{IdentityProvider, ProvisioningBackend};
use strata_core::domain::credential::{Credential, Scope};
use strata_core::domain::resource::ResourceId;
use strata_core::domain::run::{Run, RunStatus};
use strata_core::domain::stage::{SkipReason, StageAction, StageDefinition, StageStatus};
use strata_core::dto::run::{RunDefinition, RunReport};
use strata_core::error::{AuthError, GraphError, StageError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::credential::{CredentialBroker, assertion_source};
use crate::graph::{GraphCursor, StageGraph};
use crate::reconciler::{BackendReconciler, ResourceReconciler};
use crate::rollout::RolloutController;
use crate::store::{FileRunStore, RunStore};

/// Whether stages apply their changes or only report them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Apply,
    /// Observe and diff every stage without changing anything
    DryRun,
}

/// Run-level failure detected before any stage was dispatched
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Successful result of one stage
#[derive(Debug, Clone, PartialEq)]
struct StageOutcome {
    changed: bool,
    resource_id: Option<ResourceId>,
}

/// Everything a spawned stage task needs
#[derive(Clone)]
struct Dispatcher {
    broker: Arc<CredentialBroker>,
    reconciler: Arc<dyn ResourceReconciler>,
    rollouts: Arc<RolloutController>,
    call_timeout: Duration,
    mode: ExecutionMode,
}

impl Dispatcher {
    async fn run_stage(
        &self,
        definition: &StageDefinition,
        credential: &Credential,
        scope: &Scope,
    ) -> Result<StageOutcome, StageError> {
        let deadline = Instant::now() + self.call_timeout;

        match (&definition.action, self.mode) {
            (StageAction::Reconcile { resource }, ExecutionMode::Apply) => {
                let result = self
                    .reconciler
                    .reconcile(resource, credential, deadline)
                    .await?;
                Ok(StageOutcome {
                    changed: result.changed,
                    resource_id: Some(result.resource_id),
                })
            }
            (StageAction::Reconcile { resource }, ExecutionMode::DryRun) => {
                let plan = self.reconciler.plan(resource, credential, deadline).await?;
                Ok(StageOutcome {
                    changed: plan.would_change(),
                    resource_id: plan.resource_id,
                })
            }
            (StageAction::Rollout { rollout }, ExecutionMode::Apply) => {
                let outcome = self.rollouts.execute(rollout, &self.broker, scope).await?;
                Ok(StageOutcome {
                    changed: outcome.changed,
                    resource_id: outcome.resource_id,
                })
            }
            (StageAction::Rollout { rollout }, ExecutionMode::DryRun) => {
                let outcome = self.rollouts.preview(rollout, &self.broker, scope).await?;
                Ok(StageOutcome {
                    changed: outcome.changed,
                    resource_id: outcome.resource_id,
                })
            }
        }
    }
}

/// Executes run definitions against a provisioning backend
pub struct PipelineExecutor {
    dispatcher: Dispatcher,
    default_scope: Scope,
    max_parallel_stages: usize,
    store: Option<Arc<dyn RunStore>>,
}

impl PipelineExecutor {
    pub fn new(
        broker: Arc<CredentialBroker>,
        reconciler: Arc<dyn ResourceReconciler>,
        rollouts: Arc<RolloutController>,
        default_scope: Scope,
    ) -> Self {
        Self {
            dispatcher: Dispatcher {
                broker,
                reconciler,
                rollouts,
                call_timeout: Duration::from_secs(120),
                mode: ExecutionMode::Apply,
            },
            default_scope,
            max_parallel_stages: 4,
            store: None,
        }
    }

    /// Wires every component from the engine configuration
    pub fn from_config(
        config: &EngineConfig,
        identity: Arc<dyn IdentityProvider>,
        backend: Arc<dyn ProvisioningBackend>,
    ) -> Self {
        let broker = Arc::new(CredentialBroker::new(
            identity,
            assertion_source(&config.assertion, &config.assertion_issuer),
            config.credential_horizon(),
        ));
        let reconciler: Arc<dyn ResourceReconciler> =
            Arc::new(BackendReconciler::new(backend, config.retry));
        let rollouts = Arc::new(
            RolloutController::new(Arc::clone(&reconciler), config.call_timeout)
                .with_step_interval(config.rollout_step_interval),
        );

        Self::new(broker, reconciler, rollouts, config.default_scope.clone())
            .with_max_parallel_stages(config.max_parallel_stages)
            .with_call_timeout(config.call_timeout)
            .with_store(Arc::new(FileRunStore::new(config.state_dir.clone())))
    }

    pub fn with_max_parallel_stages(mut self, max_parallel_stages: usize) -> Self {
        self.max_parallel_stages = max_parallel_stages.max(1);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.dispatcher.call_timeout = call_timeout;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.dispatcher.mode = mode;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.dispatcher.mode
    }

    /// Runs a definition to completion
    ///
    /// Returns `Err` only when the run cannot start (invalid graph or no
    /// credential). Stage failures, cancellation and mid-run credential
    /// failures are reported through the returned report.
    pub async fn execute(
        &self,
        definition: &RunDefinition,
        cancel: &CancelSignal,
    ) -> Result<RunReport, RunError> {
        let graph = StageGraph::build(&definition.stages)?;
        let scope = definition
            .scope
            .clone()
            .unwrap_or_else(|| self.default_scope.clone());

        self.dispatcher.broker.acquire(&scope).await?;

        let events = InMemoryEventLog::new();
        let mut run = Run::new(
            definition.name.clone(),
            definition.stages.clone(),
            graph.topological_order(),
        );
        run.status = RunStatus::Running;

        info!(
            "Starting run {} ({}) with {} stage(s), mode {:?}",
            run.id,
            run.name,
            graph.len(),
            self.dispatcher.mode
        );
        events.info(None, format!("Run started with {} stage(s)", graph.len()));

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_stages));
        let mut cursor = GraphCursor::new(&graph);
        let mut succeeded = BTreeSet::new();
        let mut first_wave = true;

        loop {
            if cancel.is_cancelled() {
                let skipped = run.skip_pending(SkipReason::Cancelled);
                warn!("Run {} cancelled, {} stage(s) skipped", run.id, skipped.len());
                events.warning(
                    None,
                    format!("Run cancelled, skipped: {}", skipped.join(", ")),
                );
                break;
            }

            let wave = cursor.next_wave(&succeeded);
            if wave.is_empty() {
                break;
            }

            if !std::mem::take(&mut first_wave) {
                if let Err(e) = self.dispatcher.broker.acquire(&scope).await {
                    self.abort_run(&mut run, &events, e.to_string());
                    break;
                }
            }

            info!("Dispatching wave: {}", wave.join(", "));
            let results = self
                .dispatch_wave(&mut run, &wave, &scope, &semaphore, &events)
                .await;

            let mut run_error = None;
            for (name, result) in results {
                match result {
                    Ok(outcome) => {
                        if let Some(stage) = run.stage_mut(&name) {
                            stage.succeed(outcome.changed, outcome.resource_id);
                        }
                        info!("Stage {} succeeded (changed: {})", name, outcome.changed);
                        events.info(
                            Some(name.as_str()),
                            format!("Succeeded (changed: {})", outcome.changed),
                        );
                        succeeded.insert(name);
                    }
                    Err(e) => {
                        error!("Stage {} failed: {}", name, e);
                        events.error(Some(name.as_str()), format!("Failed: {}", e));
                        if let StageError::Auth(auth) = &e {
                            run_error.get_or_insert_with(|| auth.to_string());
                        }
                        if let Some(stage) = run.stage_mut(&name) {
                            stage.fail(e);
                        }
                        self.skip_dependents(&mut run, &graph, &mut cursor, &name, &events);
                    }
                }
            }

            if let Some(message) = run_error {
                self.abort_run(&mut run, &events, message);
                break;
            }
        }

        let status = run.finish();
        info!(
            "Run {} finished: {} ({} succeeded, {} failed, {} skipped)",
            run.id,
            status,
            run.count(StageStatus::Succeeded),
            run.count(StageStatus::Failed),
            run.count(StageStatus::Skipped)
        );
        events.info(None, format!("Run finished: {}", status));

        let mut report = RunReport::from_run(&run, events.drain());
        report.dry_run = self.dispatcher.mode == ExecutionMode::DryRun;

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&report).await {
                warn!("Failed to store report of run {}: {:#}", run.id, e);
            }
        }

        Ok(report)
    }

    /// Runs one wave and waits for every stage of it
    ///
    /// Each stage asks the broker for its credential after taking a permit.
    async fn dispatch_wave(
        &self,
        run: &mut Run,
        wave: &[String],
        scope: &Scope,
        semaphore: &Arc<Semaphore>,
        events: &InMemoryEventLog,
    ) -> Vec<(String, Result<StageOutcome, StageError>)> {
        let mut handles = Vec::with_capacity(wave.len());

        for name in wave {
            let Some(stage) = run.stage_mut(name) else {
                continue;
            };
            stage.start();
            events.info(
                Some(name.as_str()),
                format!("Started ({})", stage.definition.kind()),
            );

            let definition = stage.definition.clone();
            let dispatcher = self.dispatcher.clone();
            let scope = scope.clone();
            let semaphore = Arc::clone(semaphore);

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| StageError::Internal(e.to_string()))?;
                let credential = dispatcher.broker.acquire(&scope).await?;
                dispatcher.run_stage(&definition, &credential, &scope).await
            });
            handles.push((name.clone(), handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Stage task {} panicked: {}", name, e);
                    Err(StageError::Internal(e.to_string()))
                }
            };
            results.push((name, result));
        }
        results
    }

    fn skip_dependents(
        &self,
        run: &mut Run,
        graph: &StageGraph,
        cursor: &mut GraphCursor<'_>,
        failed: &str,
        events: &InMemoryEventLog,
    ) {
        let dependents = graph.transitive_dependents(failed);
        for name in &dependents {
            let skipped = run.stage_mut(name).is_some_and(|stage| {
                stage.skip(SkipReason::DependencyFailed {
                    dependency: failed.to_string(),
                })
            });
            if skipped {
                info!("Skipping stage {} (dependency {} failed)", name, failed);
                events.warning(
                    Some(name.as_str()),
                    format!("Skipped: dependency '{}' failed", failed),
                );
            }
        }
        cursor.retire(dependents);
    }

    fn abort_run(&self, run: &mut Run, events: &InMemoryEventLog, message: String) {
        error!("Run {} aborted: {}", run.id, message);
        events.error(None, format!("Run aborted: {}", message));
        run.error.get_or_insert(message);
        run.skip_pending(SkipReason::RunAborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::testing::{FakeBackend, FakeIdentity, StaticAssertion};
    use serde_json::json;
    use strata_core::domain::resource::ResourceDescriptor;
    use strata_core::domain::rollout::{RolloutSpec, WeightSnapshot, deployment_descriptor};
    use strata_core::error::{AuthFailure, ReconcileError};

    fn executor(backend: Arc<FakeBackend>, identity: FakeIdentity) -> PipelineExecutor {
        executor_with_horizon(backend, identity, Duration::from_secs(60))
    }

    fn executor_with_horizon(
        backend: Arc<FakeBackend>,
        identity: FakeIdentity,
        horizon: Duration,
    ) -> PipelineExecutor {
        let broker = Arc::new(CredentialBroker::new(
            Arc::new(identity),
            Arc::new(StaticAssertion::new("assertion")),
            horizon,
        ));
        let reconciler: Arc<dyn ResourceReconciler> =
            Arc::new(BackendReconciler::new(backend, RetryPolicy::none()));
        let rollouts = Arc::new(RolloutController::new(
            Arc::clone(&reconciler),
            Duration::from_secs(5),
        ));
        PipelineExecutor::new(broker, reconciler, rollouts, Scope::new("mgmt"))
            .with_call_timeout(Duration::from_secs(5))
    }

    fn healthy() -> FakeIdentity {
        FakeIdentity::with_lifetime(3600)
    }

    fn resource(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new("compute", name).with_property("size", json!("small"))
    }

    fn stage(name: &str, deps: &[&str]) -> StageDefinition {
        deps.iter()
            .fold(StageDefinition::reconcile(name, resource(name)), |def, dep| {
                def.after(*dep)
            })
    }

    fn definition(stages: Vec<StageDefinition>) -> RunDefinition {
        RunDefinition {
            name: "test-run".to_string(),
            scope: None,
            stages,
        }
    }

    fn ml_platform() -> RunDefinition {
        definition(vec![
            stage("register-environment", &[]),
            stage("register-dataset", &[]),
            stage("create-compute", &[]),
            stage(
                "run-training",
                &["register-environment", "register-dataset", "create-compute"],
            ),
            stage("create-endpoint", &[]),
            StageDefinition::reconcile(
                "create-deployment",
                deployment_descriptor("blue").with_property("endpoint", json!("churn")),
            )
            .after("run-training")
            .after("create-endpoint"),
            StageDefinition::rollout(
                "allocate-traffic",
                RolloutSpec {
                    endpoint: "churn".to_string(),
                    targets: [("blue".to_string(), 100)].into_iter().collect(),
                    steps: 1,
                },
            )
            .after("create-deployment"),
        ])
    }

    fn status(report: &RunReport, name: &str) -> StageStatus {
        report.stage(name).unwrap().status
    }

    #[tokio::test]
    async fn test_full_pipeline_succeeds() {
        let backend = Arc::new(FakeBackend::new());
        let report = executor(backend.clone(), healthy())
            .execute(&ml_platform(), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        assert!(report.stages.iter().all(|s| s.status == StageStatus::Succeeded));
        assert!(report.stages.iter().all(|s| s.changed));
        assert_eq!(report.stages.last().unwrap().name, "allocate-traffic");
        assert!(backend.state("endpoint-traffic/churn").is_some());
        assert!(!report.events.is_empty());
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_apply(
            "compute/a",
            ReconcileError::new(
                strata_core::error::ReconcileFailure::QuotaExceeded,
                "no cores",
            ),
        );

        let report = executor(backend, healthy())
            .execute(
                &definition(vec![stage("a", &[]), stage("b", &["a"]), stage("c", &[])]),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(status(&report, "a"), StageStatus::Failed);
        assert_eq!(status(&report, "b"), StageStatus::Skipped);
        assert_eq!(status(&report, "c"), StageStatus::Succeeded);
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.stage("a").unwrap().reason.as_deref(), Some("quota-exceeded"));
        assert_eq!(report.stage("b").unwrap().reason.as_deref(), Some("skipped"));
    }

    fn shift_traffic(targets: &[(&str, u8)], steps: u32) -> StageDefinition {
        StageDefinition::rollout(
            "shift-traffic",
            RolloutSpec {
                endpoint: "churn".to_string(),
                targets: targets.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                steps,
            },
        )
    }

    #[tokio::test]
    async fn test_invalid_rollout_fails_stage_and_skips_dependents() {
        let backend = Arc::new(FakeBackend::new());
        let def = definition(vec![
            shift_traffic(&[("blue", 60), ("green", 30)], 2),
            stage("smoke-test", &["shift-traffic"]),
            stage("unrelated", &[]),
        ]);

        let report = executor(backend, healthy())
            .execute(&def, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(status(&report, "shift-traffic"), StageStatus::Failed);
        assert_eq!(
            report.stage("shift-traffic").unwrap().reason.as_deref(),
            Some("invalid-weights")
        );
        assert_eq!(status(&report, "smoke-test"), StageStatus::Skipped);
        assert_eq!(status(&report, "unrelated"), StageStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_failed_rollout_step_is_reported_and_rolled_back() {
        let backend = Arc::new(FakeBackend::new());
        let live = WeightSnapshot::try_new(
            "churn",
            [("blue".to_string(), 100), ("green".to_string(), 0)]
                .into_iter()
                .collect(),
        )
        .unwrap();
        backend.seed(&live.to_descriptor());
        backend.fail_nth_apply(
            "endpoint-traffic/churn",
            2,
            ReconcileError::unreachable("connection reset"),
        );
        let def = definition(vec![
            shift_traffic(&[("blue", 50), ("green", 50)], 3),
            stage("smoke-test", &["shift-traffic"]),
        ]);

        let report = executor(backend.clone(), healthy())
            .execute(&def, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(status(&report, "shift-traffic"), StageStatus::Failed);
        assert_eq!(
            report.stage("shift-traffic").unwrap().reason.as_deref(),
            Some("backend-unreachable")
        );
        assert_eq!(status(&report, "smoke-test"), StageStatus::Skipped);
        assert_eq!(
            backend.state("endpoint-traffic/churn").unwrap().properties["traffic"],
            json!({"blue": 83, "green": 17})
        );
    }

    #[tokio::test]
    async fn test_skip_cascades_transitively() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_apply("compute/a", ReconcileError::conflict("etag mismatch"));

        let report = executor(backend, healthy())
            .execute(
                &definition(vec![stage("a", &[]), stage("b", &["a"]), stage("c", &["b"])]),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(status(&report, "c"), StageStatus::Skipped);
        assert!(report.stage("c").unwrap().error.as_ref().unwrap().contains("'a'"));
    }

    #[tokio::test]
    async fn test_rerun_resumes_and_detects_no_change() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_apply("compute/c", ReconcileError::unreachable("connection reset"));
        let executor = executor(backend.clone(), healthy());
        let def = definition(vec![stage("a", &[]), stage("b", &["a"]), stage("c", &["b"])]);

        let first = executor.execute(&def, &CancelSignal::never()).await.unwrap();
        assert_eq!(first.status, RunStatus::Failed);
        assert_eq!(
            first.stage("c").unwrap().reason.as_deref(),
            Some("backend-unreachable")
        );

        backend.heal("compute/c");
        let second = executor.execute(&def, &CancelSignal::never()).await.unwrap();

        assert_eq!(second.status, RunStatus::Succeeded);
        assert!(!second.stage("a").unwrap().changed);
        assert!(!second.stage("b").unwrap().changed);
        assert!(second.stage("c").unwrap().changed);
        assert_eq!(
            second.stage("a").unwrap().resource_id,
            first.stage("a").unwrap().resource_id
        );
        assert_eq!(backend.apply_count("compute/a"), 1);
    }

    #[tokio::test]
    async fn test_rerun_repairs_drift() {
        let backend = Arc::new(FakeBackend::new());
        let executor = executor(backend.clone(), healthy());
        let def = definition(vec![stage("a", &[]), stage("b", &[])]);

        executor.execute(&def, &CancelSignal::never()).await.unwrap();
        backend.drift("compute/b", "size", json!("large"));
        let report = executor.execute(&def, &CancelSignal::never()).await.unwrap();

        assert!(!report.stage("a").unwrap().changed);
        assert!(report.stage("b").unwrap().changed);
        assert_eq!(backend.state("compute/b").unwrap().properties["size"], json!("small"));
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_any_stage() {
        let backend = Arc::new(FakeBackend::new());
        let err = executor(backend.clone(), healthy())
            .execute(
                &definition(vec![stage("a", &["b"]), stage("b", &["a"])]),
                &CancelSignal::never(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Graph(GraphError::Cycle(_))));
        assert_eq!(backend.get_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_before_any_stage() {
        let backend = Arc::new(FakeBackend::new());
        let err = executor(backend.clone(), FakeIdentity::failing(AuthFailure::ScopeDenied))
            .execute(&ml_platform(), &CancelSignal::never())
            .await
            .unwrap_err();

        match err {
            RunError::Auth(e) => assert_eq!(e.reason, AuthFailure::ScopeDenied),
            other => panic!("expected auth error, got {:?}", other),
        }
        assert_eq!(backend.get_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_mid_run_fails_run() {
        let backend = Arc::new(FakeBackend::new());
        // Tokens are shorter than the horizon, so every acquire re-exchanges
        let identity = FakeIdentity::failing_after(2, 30, AuthFailure::IssuerUnreachable);

        let report = executor(backend, identity)
            .execute(
                &definition(vec![stage("a", &[]), stage("b", &["a"])]),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(status(&report, "a"), StageStatus::Succeeded);
        assert_eq!(status(&report, "b"), StageStatus::Skipped);
        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.error.as_ref().unwrap().contains("issuer-unreachable"));
    }

    #[tokio::test]
    async fn test_queued_stages_refresh_expiring_credentials() {
        let backend = Arc::new(FakeBackend::new());
        let names = ["a", "b", "c", "d"];
        for name in names {
            backend.delay(&format!("compute/{}", name), Duration::from_millis(300));
        }
        let identity = FakeIdentity::with_lifetime(2);
        let def = definition(names.iter().map(|n| stage(n, &[])).collect());

        let report = executor_with_horizon(backend.clone(), identity, Duration::from_secs(1))
            .with_max_parallel_stages(1)
            .execute(&def, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(backend.expired_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_lets_in_flight_stages_finish() {
        let backend = Arc::new(FakeBackend::new());
        backend.delay("compute/a", Duration::from_millis(200));
        let executor = executor(backend, healthy());
        let (trigger, signal) = cancellation();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let report = executor
            .execute(
                &definition(vec![stage("a", &[]), stage("b", &["a"])]),
                &signal,
            )
            .await
            .unwrap();
        canceller.await.unwrap();

        assert_eq!(status(&report, "a"), StageStatus::Succeeded);
        assert_eq!(status(&report, "b"), StageStatus::Skipped);
        assert_eq!(report.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let backend = Arc::new(FakeBackend::new());
        let names = ["a", "b", "c", "d", "e", "f"];
        for name in names {
            backend.delay(&format!("compute/{}", name), Duration::from_millis(30));
        }
        let def = definition(names.iter().map(|n| stage(n, &[])).collect());

        let report = executor(backend.clone(), healthy())
            .with_max_parallel_stages(2)
            .execute(&def, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Succeeded);
        assert!(backend.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_wave_stages_run_concurrently() {
        let backend = Arc::new(FakeBackend::new());
        for name in ["a", "b", "c"] {
            backend.delay(&format!("compute/{}", name), Duration::from_millis(50));
        }
        let def = definition(vec![stage("a", &[]), stage("b", &[]), stage("c", &[])]);

        executor(backend.clone(), healthy())
            .execute(&def, &CancelSignal::never())
            .await
            .unwrap();

        assert!(backend.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_dry_run_applies_nothing() {
        let backend = Arc::new(FakeBackend::new());
        backend.seed(&resource("create-compute"));

        let report = executor(backend.clone(), healthy())
            .with_mode(ExecutionMode::DryRun)
            .execute(&ml_platform(), &CancelSignal::never())
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.status, RunStatus::Succeeded);
        assert!(!report.stage("create-compute").unwrap().changed);
        assert!(report.stage("run-training").unwrap().changed);
        assert!(report.stage("allocate-traffic").unwrap().changed);
        assert!(backend.applied().is_empty());
    }

    #[tokio::test]
    async fn test_report_is_stored() {
        let dir = std::env::temp_dir().join(format!("strata-exec-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(FileRunStore::new(&dir));
        let backend = Arc::new(FakeBackend::new());

        let report = executor(backend, healthy())
            .with_store(store.clone())
            .execute(&definition(vec![stage("a", &[])]), &CancelSignal::never())
            .await
            .unwrap();

        let stored = store.load(report.run_id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Succeeded);
        assert_eq!(stored.stages, report.stages);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
