//! Resource reconciler
//!
//! Brings a backend resource in line with a desired-state descriptor by
//! applying only the delta. The delta is a pure function of the observed and
//! desired states, so a second reconcile without drift is a no-op.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::backend::ProvisioningBackend;
use strata_core::domain::credential::Credential;
use strata_core::domain::resource::{
    DiffAction, FieldChange, ResourceDescriptor, ResourceDiff, ResourceId, ResourceState,
};
use strata_core::error::ReconcileError;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::retry::RetryPolicy;

/// Outcome of a successful reconcile
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult {
    pub changed: bool,
    pub resource_id: ResourceId,
}

/// What a reconcile would do, without doing it
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub diff: ResourceDiff,
    /// Id of the existing resource, `None` if it would be created
    pub resource_id: Option<ResourceId>,
}

impl ReconcilePlan {
    pub fn would_change(&self) -> bool {
        !self.diff.is_empty()
    }
}

/// Computes the delta from `observed` to `desired`
///
/// Properties the backend reports but `desired` does not mention are left
/// alone. A change to a field declared immutable turns the diff into a
/// replace; nothing else does.
pub fn diff(desired: &ResourceDescriptor, observed: Option<&ResourceState>) -> ResourceDiff {
    let Some(observed) = observed else {
        let changes = desired
            .properties
            .iter()
            .map(|(key, value)| {
                (
                    key.clone(),
                    FieldChange {
                        from: None,
                        to: value.clone(),
                    },
                )
            })
            .collect();
        return ResourceDiff {
            action: DiffAction::Create,
            changes,
        };
    };

    let changes: BTreeMap<String, FieldChange> = desired
        .properties
        .iter()
        .filter(|(key, value)| observed.properties.get(*key) != Some(*value))
        .map(|(key, value)| {
            (
                key.clone(),
                FieldChange {
                    from: observed.properties.get(key).cloned(),
                    to: value.clone(),
                },
            )
        })
        .collect();

    let action = if changes
        .keys()
        .any(|field| desired.immutable_fields.contains(field))
    {
        DiffAction::Replace
    } else {
        DiffAction::Update
    };

    ResourceDiff { action, changes }
}

/// Rejects descriptors the backend could never satisfy
pub fn validate(desired: &ResourceDescriptor) -> Result<(), ReconcileError> {
    if desired.kind.trim().is_empty() {
        return Err(ReconcileError::invalid("resource kind cannot be empty"));
    }
    if desired.name.trim().is_empty() {
        return Err(ReconcileError::invalid(format!(
            "resource of kind '{}' has no name",
            desired.kind
        )));
    }
    if let Some(field) = desired
        .immutable_fields
        .iter()
        .find(|field| !desired.properties.contains_key(*field))
    {
        return Err(ReconcileError::invalid(format!(
            "{} declares immutable field '{}' without a value",
            desired.address(),
            field
        )));
    }
    Ok(())
}

/// Reconciliation contract used by the executor and the rollout controller
#[async_trait]
pub trait ResourceReconciler: Send + Sync {
    /// Reads the current state of a resource
    async fn observe(
        &self,
        descriptor: &ResourceDescriptor,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<Option<ResourceState>, ReconcileError>;

    /// Computes the delta without applying it
    async fn plan(
        &self,
        desired: &ResourceDescriptor,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<ReconcilePlan, ReconcileError>;

    /// Applies the delta, if any
    async fn reconcile(
        &self,
        desired: &ResourceDescriptor,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<ReconcileResult, ReconcileError>;
}

/// Reconciler backed by a provisioning backend
pub struct BackendReconciler {
    backend: Arc<dyn ProvisioningBackend>,
    retry: RetryPolicy,
}

impl BackendReconciler {
    pub fn new(backend: Arc<dyn ProvisioningBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    async fn get_state(
        &self,
        descriptor: &ResourceDescriptor,
        credential: &Credential,
    ) -> Result<Option<ResourceState>, ReconcileError> {
        self.retry
            .run(&format!("get-state {}", descriptor.address()), || {
                self.backend.get_state(descriptor, credential)
            })
            .await
    }

    async fn plan_inner(
        &self,
        desired: &ResourceDescriptor,
        credential: &Credential,
    ) -> Result<ReconcilePlan, ReconcileError> {
        validate(desired)?;
        let observed = self.get_state(desired, credential).await?;
        Ok(plan_against(desired, observed))
    }

    /// Observes, diffs and applies once; a retry starts over from observing
    async fn reconcile_inner(
        &self,
        desired: &ResourceDescriptor,
        credential: &Credential,
    ) -> Result<ReconcileResult, ReconcileError> {
        validate(desired)?;
        self.retry
            .run(&format!("reconcile {}", desired.address()), || {
                self.reconcile_once(desired, credential)
            })
            .await
    }

    async fn reconcile_once(
        &self,
        desired: &ResourceDescriptor,
        credential: &Credential,
    ) -> Result<ReconcileResult, ReconcileError> {
        let observed = self.backend.get_state(desired, credential).await?;
        let plan = plan_against(desired, observed);

        if let (false, Some(resource_id)) = (plan.would_change(), plan.resource_id.clone()) {
            debug!("{} is up to date", desired.address());
            return Ok(ReconcileResult {
                changed: false,
                resource_id,
            });
        }

        info!(
            "Applying {:?} to {} (fields: {})",
            plan.diff.action,
            desired.address(),
            plan.diff.fields().collect::<Vec<_>>().join(", ")
        );

        let resource_id = self
            .backend
            .apply_diff(desired, &plan.diff, credential)
            .await?;
        Ok(ReconcileResult {
            changed: true,
            resource_id,
        })
    }
}

fn plan_against(desired: &ResourceDescriptor, observed: Option<ResourceState>) -> ReconcilePlan {
    ReconcilePlan {
        diff: diff(desired, observed.as_ref()),
        resource_id: observed.map(|s| s.resource_id),
    }
}

/// Runs a backend interaction against a caller-supplied deadline
async fn with_deadline<T, F>(what: &str, deadline: Instant, fut: F) -> Result<T, ReconcileError>
where
    F: std::future::Future<Output = Result<T, ReconcileError>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ReconcileError::unreachable(format!(
            "{} did not complete before its deadline",
            what
        ))),
    }
}

#[async_trait]
impl ResourceReconciler for BackendReconciler {
    async fn observe(
        &self,
        descriptor: &ResourceDescriptor,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<Option<ResourceState>, ReconcileError> {
        with_deadline(
            &format!("observe {}", descriptor.address()),
            deadline,
            self.get_state(descriptor, credential),
        )
        .await
    }

    async fn plan(
        &self,
        desired: &ResourceDescriptor,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<ReconcilePlan, ReconcileError> {
        with_deadline(
            &format!("plan {}", desired.address()),
            deadline,
            self.plan_inner(desired, credential),
        )
        .await
    }

    async fn reconcile(
        &self,
        desired: &ResourceDescriptor,
        credential: &Credential,
        deadline: Instant,
    ) -> Result<ReconcileResult, ReconcileError> {
        with_deadline(
            &format!("reconcile {}", desired.address()),
            deadline,
            self.reconcile_inner(desired, credential),
        )
        .await
    }
}
