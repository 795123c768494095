//! In-memory fakes of the external collaborators used by unit tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use strata_core::backend::{IdentityProvider, ProvisioningBackend};
use strata_core::domain::credential::{Assertion, Credential, IssuedToken, Scope};
use strata_core::domain::resource::{
    DiffAction, ResourceDescriptor, ResourceDiff, ResourceId, ResourceState,
};
use strata_core::error::{AuthError, AuthFailure, ReconcileError, ReconcileFailure};

use crate::credential::AssertionSource;

pub struct StaticAssertion(String);

impl StaticAssertion {
    pub fn new(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[async_trait]
impl AssertionSource for StaticAssertion {
    async fn assertion(&self) -> Result<Assertion, AuthError> {
        Ok(Assertion {
            issuer: "https://token.ci.test".to_string(),
            value: self.0.clone(),
        })
    }
}

pub struct FakeIdentity {
    lifetime_secs: i64,
    failure: Option<AuthFailure>,
    /// Exchanges that succeed before `failure` kicks in
    healthy_calls: u32,
    calls: AtomicU32,
}

impl FakeIdentity {
    pub fn with_lifetime(lifetime_secs: i64) -> Self {
        Self {
            lifetime_secs,
            failure: None,
            healthy_calls: 0,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(reason: AuthFailure) -> Self {
        Self::failing_after(0, 0, reason)
    }

    /// Issues `healthy_calls` tokens of the given lifetime, then refuses
    pub fn failing_after(healthy_calls: u32, lifetime_secs: i64, reason: AuthFailure) -> Self {
        Self {
            lifetime_secs,
            failure: Some(reason),
            healthy_calls,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn exchange(
        &self,
        _assertion: &Assertion,
        scope: &Scope,
    ) -> Result<IssuedToken, AuthError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let (Some(reason), true) = (self.failure, n >= self.healthy_calls) {
            return Err(AuthError::new(reason, "fake identity provider refused"));
        }
        Ok(IssuedToken {
            value: format!("token-{}-{}", scope, n),
            expires_in: chrono::Duration::seconds(self.lifetime_secs),
        })
    }
}

/// Provisioning backend keeping resources in memory
#[derive(Default)]
pub struct FakeBackend {
    resources: Mutex<BTreeMap<String, ResourceState>>,
    /// Out-of-band creations landing right after the next get-state
    pending_writes: Mutex<HashMap<String, ResourceDescriptor>>,
    apply_failures: Mutex<HashMap<String, ReconcileError>>,
    /// Fail the n-th apply (1-based) of an address, once
    apply_failure_at: Mutex<HashMap<String, (usize, ReconcileError)>>,
    delays: Mutex<HashMap<String, Duration>>,
    applied: Mutex<Vec<ResourceDescriptor>>,
    next_id: AtomicUsize,
    gets: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    expired_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a resource as if it had been created out of band
    pub fn seed(&self, descriptor: &ResourceDescriptor) -> ResourceId {
        let id = self.allocate_id(descriptor);
        self.resources.lock().unwrap().insert(
            descriptor.address(),
            ResourceState {
                resource_id: id.clone(),
                properties: descriptor.properties.clone(),
            },
        );
        id
    }

    /// Simulates an external change of one property
    pub fn drift(&self, address: &str, key: &str, value: serde_json::Value) {
        if let Some(state) = self.resources.lock().unwrap().get_mut(address) {
            state.properties.insert(key.to_string(), value);
        }
    }

    /// Lets another writer create `descriptor` between the next get-state
    /// and the apply-diff that follows it
    pub fn write_after_next_get(&self, descriptor: &ResourceDescriptor) {
        self.pending_writes
            .lock()
            .unwrap()
            .insert(descriptor.address(), descriptor.clone());
    }

    pub fn fail_apply(&self, address: &str, error: ReconcileError) {
        self.apply_failures
            .lock()
            .unwrap()
            .insert(address.to_string(), error);
    }

    pub fn fail_nth_apply(&self, address: &str, n: usize, error: ReconcileError) {
        self.apply_failure_at
            .lock()
            .unwrap()
            .insert(address.to_string(), (n, error));
    }

    pub fn heal(&self, address: &str) {
        self.apply_failures.lock().unwrap().remove(address);
        self.apply_failure_at.lock().unwrap().remove(address);
    }

    pub fn delay(&self, address: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(address.to_string(), delay);
    }

    pub fn state(&self, address: &str) -> Option<ResourceState> {
        self.resources.lock().unwrap().get(address).cloned()
    }

    /// Every descriptor successfully applied, in order
    pub fn applied(&self) -> Vec<ResourceDescriptor> {
        self.applied.lock().unwrap().clone()
    }

    pub fn apply_count(&self, address: &str) -> usize {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.address() == address)
            .count()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls refused because the presented token had already expired
    pub fn expired_calls(&self) -> usize {
        self.expired_calls.load(Ordering::SeqCst)
    }

    fn check_token(&self, credential: &Credential) -> Result<(), ReconcileError> {
        if credential.is_expired_at(Utc::now()) {
            self.expired_calls.fetch_add(1, Ordering::SeqCst);
            return Err(ReconcileError::new(
                ReconcileFailure::Unauthorized,
                "token has expired",
            ));
        }
        Ok(())
    }

    fn allocate_id(&self, descriptor: &ResourceDescriptor) -> ResourceId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        ResourceId(format!("{}#{}", descriptor.address(), n))
    }

    async fn enter(&self, address: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProvisioningBackend for FakeBackend {
    async fn get_state(
        &self,
        descriptor: &ResourceDescriptor,
        credential: &Credential,
    ) -> Result<Option<ResourceState>, ReconcileError> {
        let address = descriptor.address();
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.enter(&address).await;
        self.leave();
        self.check_token(credential)?;

        let observed = self.resources.lock().unwrap().get(&address).cloned();
        let pending = self.pending_writes.lock().unwrap().remove(&address);
        if let Some(other) = pending {
            self.seed(&other);
        }
        Ok(observed)
    }

    async fn apply_diff(
        &self,
        descriptor: &ResourceDescriptor,
        diff: &ResourceDiff,
        credential: &Credential,
    ) -> Result<ResourceId, ReconcileError> {
        let address = descriptor.address();
        self.enter(&address).await;
        self.leave();
        self.check_token(credential)?;

        if let Some(err) = self.apply_failures.lock().unwrap().get(&address) {
            return Err(err.clone());
        }

        {
            let attempt = self.apply_count(&address) + 1;
            let mut scheduled = self.apply_failure_at.lock().unwrap();
            if let Some((n, err)) = scheduled.get(&address).cloned() {
                if n == attempt {
                    scheduled.remove(&address);
                    return Err(err);
                }
            }
        }

        let existing = self.resources.lock().unwrap().get(&address).cloned();
        let state = match (diff.action, existing) {
            (DiffAction::Update, Some(mut state)) => {
                for (key, change) in &diff.changes {
                    state.properties.insert(key.clone(), change.to.clone());
                }
                state
            }
            (DiffAction::Update, None) => {
                return Err(ReconcileError::conflict(format!(
                    "{} disappeared before update",
                    address
                )));
            }
            (DiffAction::Create, Some(_)) => {
                return Err(ReconcileError::conflict(format!("{} already exists", address)));
            }
            (DiffAction::Create, None) | (DiffAction::Replace, _) => ResourceState {
                resource_id: self.allocate_id(descriptor),
                properties: descriptor.properties.clone(),
            },
        };

        let id = state.resource_id.clone();
        self.resources.lock().unwrap().insert(address, state);
        self.applied.lock().unwrap().push(descriptor.clone());
        Ok(id)
    }
}
