//! Rollout controller
//!
//! Shifts traffic between deployments behind one endpoint as a sequence of
//! weight snapshots, each pushed through the reconciler. A failed step
//! restores the last snapshot known to be live.

mod plan;

pub use plan::{RolloutPlan, interpolate};

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_core::domain::credential::{Credential, Scope};
use strata_core::domain::resource::{ResourceId, ResourceState};
use strata_core::domain::rollout::{
    RolloutSpec, WeightSnapshot, deployment_descriptor, deployment_endpoint, total_weight,
    traffic_descriptor, weights_from_state,
};
use strata_core::error::{ReconcileError, StageError, WeightError, WeightFailure};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::credential::CredentialBroker;
use crate::reconciler::{ReconcileResult, ResourceReconciler};
use plan::EndpointLease;

/// Result of driving (or previewing) one rollout stage
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutOutcome {
    pub changed: bool,
    /// Traffic resource of the endpoint, if it exists
    pub resource_id: Option<ResourceId>,
    /// Snapshots committed, or the ones that would be in a preview
    pub snapshots: Vec<WeightSnapshot>,
}

/// Validates a rollout request and computes its snapshots
///
/// An empty `current` means the endpoint carries no traffic yet; the result
/// is then a single snapshot equal to the target. When `current` already
/// equals the target there is nothing to do. Targets absent from `current`
/// are introduced from a weight of 0; checking that they exist is up to the
/// caller.
pub fn snapshots(
    endpoint: &str,
    current: &BTreeMap<String, u8>,
    target: &BTreeMap<String, u8>,
    steps: u32,
) -> Result<Vec<WeightSnapshot>, WeightError> {
    if steps == 0 {
        return Err(WeightError::new(endpoint, WeightFailure::InvalidStepCount));
    }

    let found = total_weight(target);
    if found != 100 {
        return Err(WeightError::new(
            endpoint,
            WeightFailure::InvalidSum { found },
        ));
    }

    if current.is_empty() {
        return Ok(vec![WeightSnapshot::try_new(endpoint, target.clone())?]);
    }

    let found = total_weight(current);
    if found != 100 {
        return Err(WeightError::new(
            endpoint,
            WeightFailure::InvalidSum { found },
        ));
    }

    if normalized(current) == normalized(target) {
        return Ok(Vec::new());
    }

    (1..=steps)
        .map(|k| WeightSnapshot::try_new(endpoint, interpolate(current, target, k, steps)))
        .collect()
}

/// Drops zero weights so `{a:100}` and `{a:100, b:0}` compare equal
fn normalized(weights: &BTreeMap<String, u8>) -> BTreeMap<&String, u8> {
    weights
        .iter()
        .filter(|(_, w)| **w > 0)
        .map(|(name, w)| (name, *w))
        .collect()
}

/// Plans and drives traffic rollouts
pub struct RolloutController {
    reconciler: Arc<dyn ResourceReconciler>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    step_interval: Duration,
    call_timeout: Duration,
}

impl RolloutController {
    pub fn new(reconciler: Arc<dyn ResourceReconciler>, call_timeout: Duration) -> Self {
        Self {
            reconciler,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            step_interval: Duration::ZERO,
            call_timeout,
        }
    }

    /// Pause between two committed snapshots
    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    /// Builds a plan from `current` to `target` and locks the endpoint
    ///
    /// Fails with `rollout-in-progress` while another plan for the same
    /// endpoint is alive.
    pub fn plan(
        &self,
        endpoint: &str,
        current: &BTreeMap<String, u8>,
        target: &BTreeMap<String, u8>,
        steps: u32,
    ) -> Result<RolloutPlan, WeightError> {
        let lease = EndpointLease::acquire(&self.in_flight, endpoint)
            .ok_or_else(|| WeightError::new(endpoint, WeightFailure::RolloutInProgress))?;

        let planned = snapshots(endpoint, current, target, steps)?;
        let initial = if current.is_empty() {
            None
        } else {
            WeightSnapshot::try_new(endpoint, current.clone()).ok()
        };

        debug!(
            "Planned {} snapshot(s) for endpoint {}",
            planned.len(),
            endpoint
        );
        Ok(RolloutPlan::new(endpoint.to_string(), planned, initial, lease))
    }

    /// Reads the live traffic resource of an endpoint
    pub async fn observe(
        &self,
        endpoint: &str,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<Option<ResourceState>, ReconcileError> {
        self.reconciler
            .observe(&traffic_descriptor(endpoint), credential, deadline)
            .await
    }

    /// Current weight map of an endpoint, empty if it has no traffic yet
    pub async fn current_weights(
        &self,
        endpoint: &str,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<BTreeMap<String, u8>, ReconcileError> {
        match self.observe(endpoint, credential, deadline).await? {
            Some(state) => weights_from_state(&state),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Checks that every target missing from the live split is a deployment
    /// of this endpoint
    async fn verify_new_targets(
        &self,
        plan: &RolloutPlan,
        current: &BTreeMap<String, u8>,
        credential: &Credential,
    ) -> Result<(), StageError> {
        let Some(last) = plan.snapshots().last() else {
            return Ok(());
        };

        for target in last.targets() {
            if current.contains_key(&target.name) {
                continue;
            }
            let state = self
                .reconciler
                .observe(&deployment_descriptor(&target.name), credential, self.deadline())
                .await?;
            let serves_endpoint = state.as_ref().is_some_and(|state| {
                deployment_endpoint(state).is_none_or(|endpoint| endpoint == target.endpoint)
            });
            if !serves_endpoint {
                return Err(WeightError::new(
                    target.endpoint,
                    WeightFailure::UnknownTarget { name: target.name },
                )
                .into());
            }
            debug!(
                "Introducing deployment {} on endpoint {}",
                target.name, target.endpoint
            );
        }
        Ok(())
    }

    /// Live split and traffic resource id of an endpoint
    async fn live_split(
        &self,
        endpoint: &str,
        credential: &Credential,
    ) -> Result<(BTreeMap<String, u8>, Option<ResourceId>), ReconcileError> {
        match self.observe(endpoint, credential, self.deadline()).await? {
            Some(state) => Ok((weights_from_state(&state)?, Some(state.resource_id))),
            None => Ok((BTreeMap::new(), None)),
        }
    }

    /// Pushes one snapshot; on success it becomes the plan's last-known-good
    pub async fn commit(
        &self,
        plan: &mut RolloutPlan,
        snapshot: &WeightSnapshot,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<ReconcileResult, ReconcileError> {
        let result = self
            .reconciler
            .reconcile(&snapshot.to_descriptor(), credential, deadline)
            .await?;
        plan.record_commit(snapshot.clone());
        Ok(result)
    }

    /// Restores the last-known-good snapshot and discards the plan
    ///
    /// Returns the snapshot that was restored, `None` when the endpoint had no
    /// traffic before the plan started and nothing was ever committed.
    pub async fn abort(
        &self,
        plan: RolloutPlan,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<Option<WeightSnapshot>, ReconcileError> {
        let Some(last_good) = plan.last_committed().cloned() else {
            warn!(
                "Aborting rollout on {} with no known-good traffic split",
                plan.endpoint()
            );
            return Ok(None);
        };

        info!(
            "Aborting rollout on {}, restoring {}",
            plan.endpoint(),
            last_good
        );
        self.reconciler
            .reconcile(&last_good.to_descriptor(), credential, deadline)
            .await?;
        Ok(Some(last_good))
    }

    /// Runs a whole rollout stage
    ///
    /// A fresh credential is requested before every step so a long rollout
    /// outlives individual tokens. Any failed commit aborts the plan.
    pub async fn execute(
        &self,
        spec: &RolloutSpec,
        broker: &CredentialBroker,
        scope: &Scope,
    ) -> Result<RolloutOutcome, StageError> {
        let mut credential = broker.acquire(scope).await?;
        let (current, mut resource_id) = self.live_split(&spec.endpoint, &credential).await?;

        let mut plan = self.plan(&spec.endpoint, &current, &spec.targets, spec.steps)?;
        if plan.is_empty() {
            info!("Endpoint {} already at target traffic", spec.endpoint);
            return Ok(RolloutOutcome {
                changed: false,
                resource_id,
                snapshots: Vec::new(),
            });
        }
        self.verify_new_targets(&plan, &current, &credential).await?;

        let total = plan.snapshots().len();
        let mut committed = Vec::with_capacity(total);

        while let Some(snapshot) = plan.advance() {
            if !committed.is_empty() && !self.step_interval.is_zero() {
                tokio::time::sleep(self.step_interval).await;
            }

            credential = match broker.acquire(scope).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    self.abort_quietly(plan, &credential).await;
                    return Err(e.into());
                }
            };

            info!(
                "Rollout {} step {}/{}: {}",
                spec.endpoint,
                committed.len() + 1,
                total,
                snapshot
            );

            match self
                .commit(&mut plan, &snapshot, &credential, self.deadline())
                .await
            {
                Ok(result) => {
                    resource_id = Some(result.resource_id);
                    committed.push(snapshot);
                }
                Err(e) => {
                    warn!("Rollout {} step failed: {}", spec.endpoint, e);
                    self.abort_quietly(plan, &credential).await;
                    return Err(e.into());
                }
            }
        }

        Ok(RolloutOutcome {
            changed: true,
            resource_id,
            snapshots: committed,
        })
    }

    /// Computes what [`execute`](Self::execute) would commit without doing it
    ///
    /// New targets are not checked against the backend: in a dry run the
    /// stages creating them have not applied anything either.
    pub async fn preview(
        &self,
        spec: &RolloutSpec,
        broker: &CredentialBroker,
        scope: &Scope,
    ) -> Result<RolloutOutcome, StageError> {
        let credential = broker.acquire(scope).await?;
        let (current, resource_id) = self.live_split(&spec.endpoint, &credential).await?;

        let plan = self.plan(&spec.endpoint, &current, &spec.targets, spec.steps)?;
        Ok(RolloutOutcome {
            changed: !plan.is_empty(),
            resource_id,
            snapshots: plan.snapshots().to_vec(),
        })
    }

    async fn abort_quietly(&self, plan: RolloutPlan, credential: &Credential) {
        let endpoint = plan.endpoint().to_string();
        if let Err(e) = self.abort(plan, credential, self.deadline()).await {
            error!("Failed to restore traffic on {}: {}", endpoint, e);
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.call_timeout
    }
}
