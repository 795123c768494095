//! Traffic rollout domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::resource::{ResourceDescriptor, ResourceState};
use crate::error::{ReconcileError, WeightError, WeightFailure};

/// Backend resource kind holding an endpoint's traffic split
pub const TRAFFIC_KIND: &str = "endpoint-traffic";

/// Property of the traffic resource carrying the weight map
pub const TRAFFIC_PROPERTY: &str = "traffic";

/// Backend resource kind of a deployment that can receive traffic
pub const DEPLOYMENT_KIND: &str = "online-deployment";

/// Property of a deployment naming the endpoint it serves
pub const DEPLOYMENT_ENDPOINT_PROPERTY: &str = "endpoint";

/// A live deployment behind an endpoint and its share of traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub name: String,
    pub endpoint: String,
    pub weight: u8,
}

/// Rollout request as declared in a run definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutSpec {
    pub endpoint: String,
    /// Target weight per deployment, must sum to 100
    pub targets: BTreeMap<String, u8>,
    #[serde(default = "default_steps")]
    pub steps: u32,
}

fn default_steps() -> u32 {
    1
}

/// Complete traffic assignment for one endpoint; always sums to 100
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    endpoint: String,
    weights: BTreeMap<String, u8>,
}

impl WeightSnapshot {
    /// Builds a snapshot, refusing any distribution that does not sum to 100
    pub fn try_new(
        endpoint: impl Into<String>,
        weights: BTreeMap<String, u8>,
    ) -> Result<Self, WeightError> {
        let endpoint = endpoint.into();
        let total = total_weight(&weights);
        if total != 100 {
            return Err(WeightError::new(
                endpoint,
                WeightFailure::InvalidSum { found: total },
            ));
        }
        Ok(Self { endpoint, weights })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn weights(&self) -> &BTreeMap<String, u8> {
        &self.weights
    }

    pub fn weight(&self, target: &str) -> u8 {
        self.weights.get(target).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        total_weight(&self.weights)
    }

    pub fn targets(&self) -> Vec<DeploymentTarget> {
        self.weights
            .iter()
            .map(|(name, weight)| DeploymentTarget {
                name: name.clone(),
                endpoint: self.endpoint.clone(),
                weight: *weight,
            })
            .collect()
    }

    /// Desired-state descriptor pushing this snapshot to the endpoint
    pub fn to_descriptor(&self) -> ResourceDescriptor {
        let traffic = serde_json::to_value(&self.weights).unwrap_or_default();
        ResourceDescriptor::new(TRAFFIC_KIND, self.endpoint.clone())
            .with_property(TRAFFIC_PROPERTY, traffic)
    }
}

impl std::fmt::Display for WeightSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .weights
            .iter()
            .map(|(name, weight)| format!("{}:{}", name, weight))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Descriptor used to read the current traffic split of an endpoint
pub fn traffic_descriptor(endpoint: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(TRAFFIC_KIND, endpoint)
}

/// Descriptor used to check that a deployment exists
pub fn deployment_descriptor(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(DEPLOYMENT_KIND, name)
}

/// Endpoint an observed deployment serves, if it says
pub fn deployment_endpoint(state: &ResourceState) -> Option<&str> {
    state
        .properties
        .get(DEPLOYMENT_ENDPOINT_PROPERTY)
        .and_then(|value| value.as_str())
}

/// Extracts the weight map from an observed traffic resource
///
/// A resource without a `traffic` property carries no traffic yet. A
/// `traffic` property that is not a map of whole weights is an error.
pub fn weights_from_state(state: &ResourceState) -> Result<BTreeMap<String, u8>, ReconcileError> {
    let Some(value) = state.properties.get(TRAFFIC_PROPERTY) else {
        return Ok(BTreeMap::new());
    };
    serde_json::from_value(value.clone()).map_err(|e| {
        ReconcileError::invalid(format!(
            "traffic split of {} is unreadable ({}): {}",
            state.resource_id, value, e
        ))
    })
}

pub fn total_weight(weights: &BTreeMap<String, u8>) -> u32 {
    weights.values().map(|w| *w as u32).sum()
}
