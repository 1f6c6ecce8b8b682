// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use deppy::api::{package_version, require_package};
use deppy::{CatalogEntity, Input, MemoryStore, Resolution, Variable};
use std::sync::Arc;

/// An Input requiring `package`
pub fn requirer(name: &str, package: &str) -> Input {
    Input::new(name).with_constraint(require_package(package))
}

/// A catalog-style Input providing `package` at `version`
pub fn provider(name: &str, package: &str, version: &str) -> Input {
    Input::new(name)
        .with_class("core")
        .with_property(package_version(package, version))
}

pub fn no_entities() -> Vec<CatalogEntity> {
    Vec::new()
}

pub fn ids(selection: &[deppy::Identifier]) -> Vec<&str> {
    selection.iter().map(|id| id.as_str()).collect()
}

/// Look up a built variable by name
pub fn variable<'a>(variables: &'a [Variable], id: &str) -> &'a Variable {
    variables
        .iter()
        .find(|v| v.id().as_str() == id)
        .unwrap_or_else(|| panic!("no variable {id}"))
}

/// A store holding one Resolution named `cluster` and the given Inputs
pub fn store_with(inputs: Vec<Input>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_resolution(Resolution::new("cluster"));
    for input in inputs {
        store.upsert_input(input);
    }
    store
}
