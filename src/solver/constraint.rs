// src/solver/constraint.rs

//! Constraint variants
//!
//! Constraints are inert data. Nothing here evaluates them; only the solver
//! engine interprets them, so the fact-to-constraint mapping can change
//! independently of the satisfiability search.

use super::Identifier;
use std::fmt;
use thiserror::Error;

/// Errors raised when a constraint is built from invalid primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    #[error("at-most bound must not be negative, got {0}")]
    NegativeBound(i64),
}

/// A rule restricting which combinations of variables may be selected together
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constraint {
    /// The owning variable must be selected
    Mandatory,
    /// The owning variable must not be selected
    Prohibited,
    /// If the owner is selected, at least one of these must be selected too.
    /// An empty list makes a selected owner unsatisfiable.
    Dependency(Vec<Identifier>),
    /// If the owner is selected, none of these may be selected
    Conflict(Vec<Identifier>),
    /// At most `n` of `ids` may be selected at the same time, regardless of
    /// whether the owner is selected
    AtMost { n: usize, ids: Vec<Identifier> },
}

impl Constraint {
    pub fn mandatory() -> Self {
        Constraint::Mandatory
    }

    pub fn prohibited() -> Self {
        Constraint::Prohibited
    }

    pub fn dependency<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identifier>,
    {
        Constraint::Dependency(ids.into_iter().map(Into::into).collect())
    }

    pub fn conflict<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identifier>,
    {
        Constraint::Conflict(ids.into_iter().map(Into::into).collect())
    }

    /// Build an at-most group, rejecting a negative bound
    pub fn at_most<I, T>(n: i64, ids: I) -> Result<Self, ConstraintError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Identifier>,
    {
        let n = usize::try_from(n).map_err(|_| ConstraintError::NegativeBound(n))?;
        Ok(Constraint::AtMost {
            n,
            ids: ids.into_iter().map(Into::into).collect(),
        })
    }

    /// Short name of the variant, used in logs and failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            Constraint::Mandatory => "mandatory",
            Constraint::Prohibited => "prohibited",
            Constraint::Dependency(_) => "dependency",
            Constraint::Conflict(_) => "conflict",
            Constraint::AtMost { .. } => "at-most",
        }
    }
}

fn join(ids: &[Identifier]) -> String {
    ids.iter().map(|i| i.as_str()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Mandatory => write!(f, "mandatory"),
            Constraint::Prohibited => write!(f, "prohibited"),
            Constraint::Dependency(ids) if ids.is_empty() => {
                write!(f, "depends on a candidate that does not exist")
            }
            Constraint::Dependency(ids) => write!(f, "depends on one of [{}]", join(ids)),
            Constraint::Conflict(ids) => write!(f, "conflicts with [{}]", join(ids)),
            Constraint::AtMost { n, ids } => write!(f, "at most {} of [{}]", n, join(ids)),
        }
    }
}
