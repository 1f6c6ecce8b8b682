// src/builder/package.rs

//! `require-package` intents

use super::BuilderError;
use crate::api::{ConstraintSpec, KEY_PACKAGE, KEY_VERSION_RANGE};
use semver::{Version, VersionReq};
use tracing::debug;

/// A parsed `require-package` intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub package: String,
    pub range: Option<VersionReq>,
}

impl PackageRef {
    /// Parse the payload of a `require-package` intent declared on `input`
    pub fn parse(input: &str, spec: &ConstraintSpec) -> Result<Self, BuilderError> {
        let package = spec
            .get(KEY_PACKAGE)
            .ok_or_else(|| BuilderError::InvalidConstraintPayload {
                input: input.to_string(),
                tag: spec.type_.clone(),
                reason: format!("missing {KEY_PACKAGE}"),
            })?
            .to_string();

        let range = match spec.get(KEY_VERSION_RANGE) {
            None => None,
            Some(raw) => Some(VersionReq::parse(raw).map_err(|e| {
                BuilderError::InvalidConstraintPayload {
                    input: input.to_string(),
                    tag: spec.type_.clone(),
                    reason: format!("invalid {KEY_VERSION_RANGE} {raw:?}: {e}"),
                }
            })?),
        };

        Ok(Self { package, range })
    }

    /// Whether a candidate providing `package` at `version` satisfies this intent
    pub fn matches(&self, package: &str, version: Option<&str>) -> bool {
        if package != self.package {
            return false;
        }
        let Some(range) = &self.range else {
            return true;
        };
        let Some(raw) = version else {
            return false;
        };
        match Version::parse(raw) {
            Ok(version) => range.matches(&version),
            Err(e) => {
                debug!("Skipping {} candidate with unparseable version {:?}: {}", package, raw, e);
                false
            }
        }
    }
}
