// src/solver/error.rs

//! Solver failure types
//!
//! Every failure carries the identifiers involved so the reconciler can
//! surface a machine-actionable reason instead of a bare string.

use super::{Constraint, Identifier};
use std::fmt;
use thiserror::Error;

/// A constraint together with the variable that owns it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppliedConstraint {
    pub variable: Identifier,
    pub constraint: Constraint,
}

impl AppliedConstraint {
    pub fn new(variable: Identifier, constraint: Constraint) -> Self {
        Self {
            variable,
            constraint,
        }
    }
}

impl fmt::Display for AppliedConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.variable, self.constraint)
    }
}

/// No selection honors every constraint at once
///
/// `constraints` is sorted and deduplicated; it holds the constraints that
/// produced the final contradiction on every explored branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiableError {
    pub constraints: Vec<AppliedConstraint>,
}

impl UnsatisfiableError {
    /// Identifiers whose constraints took part in the contradiction
    pub fn variables(&self) -> Vec<&Identifier> {
        let mut ids: Vec<&Identifier> = self.constraints.iter().map(|c| &c.variable).collect();
        ids.dedup();
        ids
    }
}

impl fmt::Display for UnsatisfiableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraints not satisfiable: ")?;
        let rendered: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", rendered.join(", "))
    }
}

impl std::error::Error for UnsatisfiableError {}

/// Errors returned by [`Solver`](super::Solver)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("duplicate variable identifier {id}")]
    DuplicateVariable { id: Identifier },

    #[error("variable {id} is both mandatory and prohibited")]
    ContradictoryConstraints { id: Identifier },

    #[error(transparent)]
    Unsatisfiable(#[from] UnsatisfiableError),

    #[error("resolution exceeded its budget of {budget} search steps")]
    Timeout { budget: u64 },

    #[error("resolution cancelled")]
    Cancelled,
}

impl SolverError {
    /// Stable reason used in status conditions
    pub fn reason(&self) -> &'static str {
        match self {
            SolverError::DuplicateVariable { .. } => "DuplicateVariable",
            SolverError::ContradictoryConstraints { .. } => "ContradictoryConstraints",
            SolverError::Unsatisfiable(_) => "Unsatisfiable",
            SolverError::Timeout { .. } => "ResolutionTimeout",
            SolverError::Cancelled => "Cancelled",
        }
    }
}
