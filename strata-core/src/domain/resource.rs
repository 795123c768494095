//! Resource domain types
//!
//! The core treats resource properties as opaque JSON values. Only the
//! provisioning backend knows what an "environment" or a "compute" is.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

/// Desired state of a single backend resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Backend resource type (e.g. "environment", "dataset", "compute", "online-endpoint")
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, JsonValue>,
    /// Fields the backend cannot update in place; changing one forces a replace
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub immutable_fields: BTreeSet<String>,
}

impl ResourceDescriptor {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            properties: BTreeMap::new(),
            immutable_fields: BTreeSet::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_immutable(mut self, field: impl Into<String>) -> Self {
        self.immutable_fields.insert(field.into());
        self
    }

    /// Stable "kind/name" address used in logs and reports
    pub fn address(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

/// Backend-assigned resource identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a resource as observed at the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_id: ResourceId,
    #[serde(default)]
    pub properties: BTreeMap<String, JsonValue>,
}

/// How a diff must be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffAction {
    /// Resource does not exist yet
    Create,
    /// Patch the listed fields in place
    Update,
    /// An immutable field changed; the backend must replace the resource
    Replace,
}

/// A single property transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: Option<JsonValue>,
    pub to: JsonValue,
}

/// Delta between observed and desired state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub action: DiffAction,
    pub changes: BTreeMap<String, FieldChange>,
}

impl ResourceDiff {
    pub fn is_empty(&self) -> bool {
        self.action == DiffAction::Update && self.changes.is_empty()
    }

    /// Names of the changed fields
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }
}
