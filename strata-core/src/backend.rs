//! Boundaries to the external collaborators
//!
//! The engine only talks to the identity provider and the provisioning
//! backend through these traits. `strata-client` provides HTTP
//! implementations; tests use in-memory fakes.

use async_trait::async_trait;

use crate::domain::credential::{Assertion, Credential, IssuedToken, Scope};
use crate::domain::resource::{ResourceDescriptor, ResourceDiff, ResourceId, ResourceState};
use crate::error::{AuthError, ReconcileError};

/// Token exchange endpoint of the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges a workload identity assertion for a scoped access token
    async fn exchange(&self, assertion: &Assertion, scope: &Scope)
    -> Result<IssuedToken, AuthError>;
}

/// Cloud resource provisioning backend
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Reads the current state of a resource, `None` if it does not exist
    async fn get_state(
        &self,
        descriptor: &ResourceDescriptor,
        credential: &Credential,
    ) -> Result<Option<ResourceState>, ReconcileError>;

    /// Applies a diff and returns the id of the resulting resource
    async fn apply_diff(
        &self,
        descriptor: &ResourceDescriptor,
        diff: &ResourceDiff,
        credential: &Credential,
    ) -> Result<ResourceId, ReconcileError>;
}
