// src/builder/entity.rs

//! Discovered catalog entities

use crate::solver::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("entity {id} has no property {key:?}")]
    NotFound { id: Identifier, key: String },
}

/// A candidate discovered in a catalog rather than declared as an Input
pub trait Entity {
    fn id(&self) -> &Identifier;

    /// Look up a property, failing with `NotFound` when absent
    fn get_property(&self, key: &str) -> Result<&str, EntityError>;
}

/// Flat-property entity as served by a catalog listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntity {
    pub id: Identifier,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CatalogEntity {
    pub fn new(id: impl Into<Identifier>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl Entity for CatalogEntity {
    fn id(&self) -> &Identifier {
        &self.id
    }

    fn get_property(&self, key: &str) -> Result<&str, EntityError> {
        self.properties
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| EntityError::NotFound {
                id: self.id.clone(),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_property() {
        let entity = CatalogEntity::new("bundle-a").with_property("package", "a");
        assert_eq!(entity.get_property("package").unwrap(), "a");
        assert_eq!(
            entity.get_property("version").unwrap_err(),
            EntityError::NotFound {
                id: "bundle-a".into(),
                key: "version".to_string()
            }
        );
    }
}
