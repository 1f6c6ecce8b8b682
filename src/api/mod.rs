// src/api/mod.rs

//! Persisted record schemas
//!
//! These are the declarative records exchanged with the fact store:
//!
//! - [`InputClass`]: opaque configuration for whatever creates Inputs
//! - [`Input`]: one declared fact, with at most one requirement intent and
//!   any number of discovered properties
//! - [`Resolution`]: the desired requirements and the computed selection
//!
//! Field names serialize in camelCase so records round-trip with the
//! declarative documents users write.

mod condition;
mod snapshot;

pub use condition::{
    Condition, ConditionStatus, find_status_condition, set_status_condition,
    CONDITION_RESOLVED,
};
pub use snapshot::FactSnapshot;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input constraint tag: require some candidate providing a package
pub const REQUIRE_PACKAGE: &str = "require-package";

/// Property tag: package identity and version
pub const PACKAGE_VERSION: &str = "package-version";

/// Property tag: group/version/kind of an API the owner provides
pub const GVK: &str = "gvk";

/// Key holding a package name
pub const KEY_PACKAGE: &str = "package";

/// Key holding a version
pub const KEY_VERSION: &str = "version";

/// Optional semver range on a require-package intent
pub const KEY_VERSION_RANGE: &str = "versionRange";

pub const KEY_GROUP: &str = "group";
pub const KEY_KIND: &str = "kind";

/// Class assigned to Inputs mirrored from a catalog
pub const CATALOG_INPUT_CLASS: &str = "core";

/// A typed key/value fact
///
/// Used both for requirement intents on an Input and for the properties
/// attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub value: BTreeMap<String, String>,
}

impl TypedValue {
    pub fn new(type_: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            value: BTreeMap::new(),
        }
    }

    /// Add a key/value pair
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.value.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.value.get(key).map(String::as_str)
    }
}

/// Requirement intent declared on an Input or a Resolution
pub type ConstraintSpec = TypedValue;

/// Discovered fact attached to an Input
pub type Property = TypedValue;

/// Build a `require-package` intent
pub fn require_package(package: impl Into<String>) -> ConstraintSpec {
    TypedValue::new(REQUIRE_PACKAGE).with(KEY_PACKAGE, package)
}

/// Build a `package-version` property
pub fn package_version(package: impl Into<String>, version: impl Into<String>) -> Property {
    TypedValue::new(PACKAGE_VERSION)
        .with(KEY_PACKAGE, package)
        .with(KEY_VERSION, version)
}

/// Build a `gvk` property
pub fn gvk(
    group: impl Into<String>,
    version: impl Into<String>,
    kind: impl Into<String>,
) -> Property {
    TypedValue::new(GVK)
        .with(KEY_GROUP, group)
        .with(KEY_VERSION, version)
        .with(KEY_KIND, kind)
}

/// Configuration passed through to whatever process creates Inputs
///
/// The resolver never reads `parameters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputClass {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// A declared fact unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Input {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_constraint(mut self, constraint: ConstraintSpec) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }
}

/// Where a Resolution is in its reconcile cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ResolutionPhase {
    /// No Inputs exist yet
    #[default]
    Pending,
    /// A pass is computing a selection
    Evaluating,
    /// The last pass produced a selection
    Resolved,
    /// The last pass failed; the selection is empty
    Failed,
}

impl std::fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionPhase::Pending => write!(f, "Pending"),
            ResolutionPhase::Evaluating => write!(f, "Evaluating"),
            ResolutionPhase::Resolved => write!(f, "Resolved"),
            ResolutionPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Observed outcome of the most recent reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionStatus {
    #[serde(default)]
    pub phase: ResolutionPhase,
    #[serde(rename = "selectedIDs", default)]
    pub selected_ids: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Desired requirements and the computed selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub name: String,
    /// Optimistic concurrency token, bumped by the store on every write
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub desired_constraints: Vec<ConstraintSpec>,
    #[serde(default)]
    pub status: ResolutionStatus,
}

impl Resolution {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_constraint(mut self, constraint: ConstraintSpec) -> Self {
        self.desired_constraints.push(constraint);
        self
    }
}
