// src/api/snapshot.rs

//! Fact snapshots
//!
//! A snapshot is a self-contained document holding every record a resolution
//! pass reads. Snapshots load from YAML or JSON so a fact base can be
//! resolved offline or used as a fixture.
//!
//! ```yaml
//! inputs:
//!   - name: app
//!     constraints:
//!       - type: require-package
//!         value: { package: foo }
//!   - name: catalog-foo.v1
//!     className: core
//!     properties:
//!       - type: package-version
//!         value: { package: foo, version: 1.0.0 }
//! resolutions:
//!   - name: cluster
//! ```

use super::{Input, InputClass, Resolution};
use crate::builder::CatalogEntity;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactSnapshot {
    #[serde(default)]
    pub input_classes: Vec<InputClass>,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub entities: Vec<CatalogEntity>,
    #[serde(default)]
    pub resolutions: Vec<Resolution>,
}

impl FactSnapshot {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a snapshot, choosing the format from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PACKAGE_VERSION;

    const DOC: &str = r#"
inputs:
  - name: app
    constraints:
      - type: require-package
        value: { package: foo }
  - name: catalog-foo.v1
    className: core
    properties:
      - type: package-version
        value: { package: foo, version: 1.0.0 }
entities:
  - id: bundle-foo.v2
    properties:
      package: foo
      version: 2.0.0
resolutions:
  - name: cluster
"#;

    #[test]
    fn test_from_yaml() {
        let snapshot = FactSnapshot::from_yaml(DOC).unwrap();
        assert_eq!(snapshot.inputs.len(), 2);
        assert_eq!(snapshot.inputs[1].class_name, "core");
        assert_eq!(snapshot.inputs[1].properties[0].type_, PACKAGE_VERSION);
        assert_eq!(snapshot.entities[0].id.as_str(), "bundle-foo.v2");
        assert_eq!(snapshot.resolutions[0].name, "cluster");
        assert!(snapshot.input_classes.is_empty());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml_path = dir.path().join("facts.yaml");
        std::fs::write(&yaml_path, DOC).unwrap();
        let from_yaml = FactSnapshot::load(&yaml_path).unwrap();

        let json_path = dir.path().join("facts.json");
        std::fs::write(&json_path, serde_json::to_string(&from_yaml).unwrap()).unwrap();
        let from_json = FactSnapshot::load(&json_path).unwrap();
        assert_eq!(from_yaml, from_json);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(FactSnapshot::from_yaml("inputs: [").is_err());
    }
}
