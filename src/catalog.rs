// src/catalog.rs

//! Catalog mirroring
//!
//! Bundles discovered in a catalog are published into the fact base as
//! Inputs so they can satisfy `require-package` intents like any declared
//! fact. Only property tags the builder understands are carried over.

use crate::api::{Input, Property, CATALOG_INPUT_CLASS, GVK, PACKAGE_VERSION};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A bundle as listed by a catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogBundle {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl CatalogBundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }
}

/// Name of the Input mirroring a bundle
pub fn mirror_input_name(bundle: &str) -> String {
    format!("catalog-{bundle}")
}

/// Project a bundle into its mirror Input
pub fn mirror_bundle(bundle: &CatalogBundle) -> Input {
    let properties: Vec<Property> = bundle
        .properties
        .iter()
        .filter(|p| p.type_ == PACKAGE_VERSION || p.type_ == GVK)
        .cloned()
        .collect();

    let dropped = bundle.properties.len() - properties.len();
    if dropped > 0 {
        debug!("Dropped {} unrecognized properties from bundle {}", dropped, bundle.name);
    }

    Input {
        name: mirror_input_name(&bundle.name),
        class_name: CATALOG_INPUT_CLASS.to_string(),
        constraints: Vec::new(),
        properties,
    }
}

/// Mirror every bundle of a catalog listing, keeping listing order
pub fn mirror_catalog(bundles: &[CatalogBundle]) -> Vec<Input> {
    bundles.iter().map(mirror_bundle).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{gvk, package_version, TypedValue};

    #[test]
    fn test_mirror_bundle() {
        let bundle = CatalogBundle::new("foo.v1.0.0")
            .with_property(TypedValue::new("channel").with("name", "stable"))
            .with_property(package_version("foo", "1.0.0"))
            .with_property(gvk("example.io", "v1", "Foo"));

        let input = mirror_bundle(&bundle);
        assert_eq!(input.name, "catalog-foo.v1.0.0");
        assert_eq!(input.class_name, "core");
        assert!(input.constraints.is_empty());
        assert_eq!(
            input.properties,
            vec![package_version("foo", "1.0.0"), gvk("example.io", "v1", "Foo")]
        );
    }

    #[test]
    fn test_mirror_catalog_keeps_order() {
        let inputs = mirror_catalog(&[CatalogBundle::new("b"), CatalogBundle::new("a")]);
        let names: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["catalog-b", "catalog-a"]);
    }
}
