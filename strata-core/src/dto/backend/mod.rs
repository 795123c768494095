//! Provisioning backend wire DTOs

use serde::{Deserialize, Serialize};

use crate::domain::resource::{ResourceDescriptor, ResourceDiff, ResourceId};

/// Body of `POST /resources/{kind}/{name}/apply`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyDiffRequest {
    pub descriptor: ResourceDescriptor,
    pub diff: ResourceDiff,
}

/// Response of a successful apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyDiffResponse {
    pub resource_id: ResourceId,
}

/// Error body returned by the backend on non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendErrorBody {
    /// Machine-readable code (e.g. "Conflict", "QuotaExceeded")
    pub code: String,
    #[serde(default)]
    pub message: String,
}
