//! Resource endpoints of the provisioning backend

use async_trait::async_trait;
use strata_core::backend::ProvisioningBackend;
use strata_core::domain::credential::Credential;
use strata_core::domain::resource::{ResourceDescriptor, ResourceDiff, ResourceId, ResourceState};
use strata_core::dto::backend::{ApplyDiffRequest, ApplyDiffResponse};
use strata_core::error::ReconcileError;
use tracing::debug;

use crate::error::Result;
use crate::{ProvisioningClient, handle_response};

impl ProvisioningClient {
    fn resource_url(&self, descriptor: &ResourceDescriptor) -> String {
        format!(
            "{}/resources/{}/{}",
            self.base_url, descriptor.kind, descriptor.name
        )
    }

    /// Fetch the current state of a resource
    ///
    /// # Returns
    /// `None` when the backend answers 404
    pub async fn get_resource(
        &self,
        descriptor: &ResourceDescriptor,
        token: &str,
    ) -> Result<Option<ResourceState>> {
        let url = self.resource_url(descriptor);
        let response = self.client.get(&url).bearer_auth(token).send().await?;

        match handle_response(response).await {
            Ok(state) => Ok(Some(state)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Apply a diff to a resource
    ///
    /// # Returns
    /// The id of the created, updated or replaced resource
    pub async fn apply(
        &self,
        descriptor: &ResourceDescriptor,
        diff: &ResourceDiff,
        token: &str,
    ) -> Result<ResourceId> {
        let url = format!("{}/apply", self.resource_url(descriptor));
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&ApplyDiffRequest {
                descriptor: descriptor.clone(),
                diff: diff.clone(),
            })
            .send()
            .await?;

        let body: ApplyDiffResponse = handle_response(response).await?;
        Ok(body.resource_id)
    }
}

#[async_trait]
impl ProvisioningBackend for ProvisioningClient {
    async fn get_state(
        &self,
        descriptor: &ResourceDescriptor,
        credential: &Credential,
    ) -> std::result::Result<Option<ResourceState>, ReconcileError> {
        debug!("GET state of {}", descriptor.address());
        self.get_resource(descriptor, credential.token())
            .await
            .map_err(|e| e.into_reconcile_error())
    }

    async fn apply_diff(
        &self,
        descriptor: &ResourceDescriptor,
        diff: &ResourceDiff,
        credential: &Credential,
    ) -> std::result::Result<ResourceId, ReconcileError> {
        debug!(
            "Applying {:?} to {} ({} field(s))",
            diff.action,
            descriptor.address(),
            diff.changes.len()
        );
        self.apply(descriptor, diff, credential.token())
            .await
            .map_err(|e| e.into_reconcile_error())
    }
}
