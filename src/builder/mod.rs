// src/builder/mod.rs

//! Variable construction from declared facts
//!
//! Every resolution pass rebuilds its variable set from scratch:
//!
//! - each Input becomes one variable named after it
//! - an Input carrying a `require-package` intent becomes mandatory and
//!   depends on every other Input (then every catalog entity) providing
//!   that package, in the order the caller listed them
//! - catalog entities become unconstrained variables
//! - packages and APIs offered by more than one provider get a synthetic
//!   uniqueness variable allowing at most one of them
//!
//! Matching never reorders candidates; preference among them is decided by
//! the solver's identifier ordering.

mod entity;
mod package;

pub use entity::{CatalogEntity, Entity, EntityError};
pub use package::PackageRef;

use crate::api::{
    ConstraintSpec, Input, GVK, KEY_GROUP, KEY_KIND, KEY_PACKAGE, KEY_VERSION, PACKAGE_VERSION,
    REQUIRE_PACKAGE,
};
use crate::solver::{Constraint, Identifier, Variable};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Prefix for package uniqueness variables
pub const PACKAGE_UNIQUENESS_PREFIX: &str = "uniqueness/package/";

/// Prefix for API uniqueness variables
pub const GVK_UNIQUENESS_PREFIX: &str = "uniqueness/gvk/";

/// Errors raised while turning Inputs into variables
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("input {input}: at most one constraint is supported, found {count}")]
    MultipleConstraintsUnsupported { input: String, count: usize },

    #[error("input {input}: unsupported constraint type {tag:?}")]
    UnsupportedConstraintType { input: String, tag: String },

    #[error("input {input}: invalid {tag} constraint: {reason}")]
    InvalidConstraintPayload {
        input: String,
        tag: String,
        reason: String,
    },

    #[error("input {input}: invalid {tag} property: missing {key}")]
    InvalidPropertyPayload {
        input: String,
        tag: String,
        key: String,
    },
}

impl BuilderError {
    /// Stable machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            BuilderError::MultipleConstraintsUnsupported { .. } => "MultipleConstraintsUnsupported",
            BuilderError::UnsupportedConstraintType { .. } => "UnsupportedConstraintType",
            BuilderError::InvalidConstraintPayload { .. } => "InvalidConstraintPayload",
            BuilderError::InvalidPropertyPayload { .. } => "InvalidPropertyPayload",
        }
    }

    /// Name of the offending Input
    pub fn input(&self) -> &str {
        match self {
            BuilderError::MultipleConstraintsUnsupported { input, .. }
            | BuilderError::UnsupportedConstraintType { input, .. }
            | BuilderError::InvalidConstraintPayload { input, .. }
            | BuilderError::InvalidPropertyPayload { input, .. } => input,
        }
    }
}

/// Which optional variable families to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Emit one unconstrained variable per catalog entity
    pub include_entities: bool,
    /// Allow at most one provider per package
    pub package_uniqueness: bool,
    /// Allow at most one provider per group/version/kind
    pub gvk_uniqueness: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            include_entities: true,
            package_uniqueness: true,
            gvk_uniqueness: true,
        }
    }
}

/// Something able to satisfy a `require-package` intent
struct Provider<'a> {
    id: Identifier,
    package: &'a str,
    version: Option<&'a str>,
    /// Index of the declaring Input; entities have none
    owner: Option<usize>,
}

/// Validated property index of one build
struct Providers<'a> {
    packages: Vec<Provider<'a>>,
    /// `group/version/kind` to the Inputs declaring it
    kinds: BTreeMap<String, Vec<Identifier>>,
}

/// Turns Inputs and entities into a solver variable set
#[derive(Debug, Clone, Default)]
pub struct VariableBuilder {
    options: BuilderOptions,
}

impl VariableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BuilderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Build one variable per Input, plus entity and uniqueness variables
    ///
    /// Output order follows the input order; the solver sorts anyway.
    pub fn build<E: Entity>(
        &self,
        inputs: &[Input],
        entities: &[E],
    ) -> Result<Vec<Variable>, BuilderError> {
        let providers = self.collect_providers(inputs, entities)?;
        let mut variables = Vec::with_capacity(inputs.len() + entities.len());

        for (index, input) in inputs.iter().enumerate() {
            let variable = self.input_variable(index, input, &providers.packages)?;
            debug!("Built variable {}", variable);
            variables.push(variable);
        }

        if self.options.include_entities {
            variables.extend(entities.iter().map(|e| Variable::unconstrained(e.id().clone())));
        }

        if self.options.package_uniqueness {
            variables.extend(package_uniqueness(&providers.packages));
        }
        if self.options.gvk_uniqueness {
            variables.extend(uniqueness_variables(GVK_UNIQUENESS_PREFIX, providers.kinds));
        }

        debug!(
            "Built {} variables from {} inputs and {} entities",
            variables.len(),
            inputs.len(),
            entities.len()
        );
        Ok(variables)
    }

    fn input_variable(
        &self,
        index: usize,
        input: &Input,
        providers: &[Provider<'_>],
    ) -> Result<Variable, BuilderError> {
        let spec = match input.constraints.as_slice() {
            [] => return Ok(Variable::unconstrained(input.name.as_str())),
            [spec] => spec,
            many => {
                return Err(BuilderError::MultipleConstraintsUnsupported {
                    input: input.name.clone(),
                    count: many.len(),
                });
            }
        };

        let targets = self.requirement_targets(index, &input.name, spec, providers)?;
        Ok(Variable::new(
            input.name.as_str(),
            vec![Constraint::mandatory(), Constraint::dependency(targets)],
        ))
    }

    fn requirement_targets(
        &self,
        index: usize,
        input: &str,
        spec: &ConstraintSpec,
        providers: &[Provider<'_>],
    ) -> Result<Vec<Identifier>, BuilderError> {
        if spec.type_ != REQUIRE_PACKAGE {
            return Err(BuilderError::UnsupportedConstraintType {
                input: input.to_string(),
                tag: spec.type_.clone(),
            });
        }
        let wanted = PackageRef::parse(input, spec)?;

        let mut seen = HashSet::new();
        let targets: Vec<Identifier> = providers
            .iter()
            .filter(|p| p.owner != Some(index))
            .filter(|p| wanted.matches(p.package, p.version))
            .filter(|p| seen.insert(p.id.clone()))
            .map(|p| p.id.clone())
            .collect();

        if targets.is_empty() {
            debug!("No candidates provide {} for {}", wanted.package, input);
        }
        Ok(targets)
    }

    /// Validate every recognized property and index the providers
    ///
    /// Package providers come from Input properties first, then entities.
    /// GVK payloads are checked whether or not their uniqueness groups are
    /// wanted.
    fn collect_providers<'a, E: Entity>(
        &self,
        inputs: &'a [Input],
        entities: &'a [E],
    ) -> Result<Providers<'a>, BuilderError> {
        let mut providers = Vec::new();
        let mut kinds: BTreeMap<String, Vec<Identifier>> = BTreeMap::new();

        for (index, input) in inputs.iter().enumerate() {
            for property in &input.properties {
                let key = |name: &str| {
                    required_key(input, &property.type_, property.get(name), name)
                };
                if property.type_ == PACKAGE_VERSION {
                    providers.push(Provider {
                        id: Identifier::from(&input.name),
                        package: key(KEY_PACKAGE)?,
                        version: Some(key(KEY_VERSION)?),
                        owner: Some(index),
                    });
                } else if property.type_ == GVK {
                    let (group, version, kind) =
                        (key(KEY_GROUP)?, key(KEY_VERSION)?, key(KEY_KIND)?);
                    let gvk = format!("{group}/{version}/{kind}");
                    let id = Identifier::from(&input.name);
                    let members = kinds.entry(gvk).or_default();
                    if !members.contains(&id) {
                        members.push(id);
                    }
                }
            }
        }

        if self.options.include_entities {
            for entity in entities {
                let Ok(package) = entity.get_property(KEY_PACKAGE) else {
                    continue;
                };
                providers.push(Provider {
                    id: entity.id().clone(),
                    package,
                    version: entity.get_property(KEY_VERSION).ok(),
                    owner: None,
                });
            }
        }

        Ok(Providers {
            packages: providers,
            kinds,
        })
    }
}

fn required_key<'a>(
    input: &Input,
    tag: &str,
    value: Option<&'a str>,
    key: &str,
) -> Result<&'a str, BuilderError> {
    value.ok_or_else(|| BuilderError::InvalidPropertyPayload {
        input: input.name.clone(),
        tag: tag.to_string(),
        key: key.to_string(),
    })
}

fn package_uniqueness(providers: &[Provider<'_>]) -> Vec<Variable> {
    let mut groups: BTreeMap<&str, Vec<Identifier>> = BTreeMap::new();
    for provider in providers {
        let members = groups.entry(provider.package).or_default();
        if !members.contains(&provider.id) {
            members.push(provider.id.clone());
        }
    }
    uniqueness_variables(PACKAGE_UNIQUENESS_PREFIX, groups)
}

fn uniqueness_variables<K: AsRef<str>>(
    prefix: &str,
    groups: BTreeMap<K, Vec<Identifier>>,
) -> Vec<Variable> {
    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, members)| {
            Variable::new(
                format!("{prefix}{}", key.as_ref()),
                vec![Constraint::AtMost { n: 1, ids: members }],
            )
        })
        .collect()
}

/// Turn a Resolution's desired constraints into synthetic requirement Inputs
///
/// Each is named `<resolution>/desired/<index>` and is matched exactly like
/// an Input declaring the same intent.
pub fn desired_inputs(resolution: &str, desired: &[ConstraintSpec]) -> Vec<Input> {
    desired
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            Input::new(format!("{resolution}/desired/{i}")).with_constraint(spec.clone())
        })
        .collect()
}

/// Build variables with default options
pub fn build_variables<E: Entity>(
    inputs: &[Input],
    entities: &[E],
) -> Result<Vec<Variable>, BuilderError> {
    VariableBuilder::new().build(inputs, entities)
}
