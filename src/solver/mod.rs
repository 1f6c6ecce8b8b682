// src/solver/mod.rs

//! Constraint model and resolver
//!
//! A resolution problem is a flat set of [`Variable`]s, each naming one
//! candidate decision point by [`Identifier`] and carrying the
//! [`Constraint`]s that restrict it. Constraints reference other variables
//! only by identifier, so the set forms a graph addressed through a map
//! rather than through ownership.
//!
//! The [`Solver`] turns a variable set into the selection that satisfies
//! every constraint, or explains why none exists.
//!
//! ```text
//! Vec<Variable> ──► Solver::new ──► propagate ──► search ──► Vec<Identifier>
//!                      │                │            │
//!                 duplicates      contradictions  budget / cancel
//! ```

mod constraint;
mod engine;
mod error;

pub use constraint::{Constraint, ConstraintError};
pub use engine::{solve, Solver, SolverOptions, DEFAULT_STEP_BUDGET};
pub use error::{AppliedConstraint, SolverError, UnsatisfiableError};

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opaque name of one candidate unit
///
/// Ordering is byte-wise lexical and is only ever used for deterministic
/// tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&String> for Identifier {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One candidate decision point
///
/// Variables are immutable once built; a fresh set is built on every
/// resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    id: Identifier,
    constraints: Vec<Constraint>,
}

impl Variable {
    /// Create a variable with the given constraints, in order
    pub fn new(id: impl Into<Identifier>, constraints: Vec<Constraint>) -> Self {
        Self {
            id: id.into(),
            constraints,
        }
    }

    /// Create a variable with no constraints
    ///
    /// Such a variable is only ever selected because something depends on it.
    pub fn unconstrained(id: impl Into<Identifier>) -> Self {
        Self::new(id, Vec::new())
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.constraints.is_empty() {
            let rendered: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
            write!(f, " [{}]", rendered.join("; "))?;
        }
        Ok(())
    }
}
