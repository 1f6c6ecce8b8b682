// src/error.rs

//! Crate-level error type

use crate::builder::BuilderError;
use crate::config::ConfigError;
use crate::controller::StoreError;
use crate::solver::SolverError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Inputs could not be turned into variables
    #[error(transparent)]
    Builder(#[from] BuilderError),

    /// Variables could not be resolved
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Fact or resolution store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A transient store failure persisted through every retry
    #[error("Giving up on {name} after {attempts} attempts: {last}")]
    RetriesExhausted {
        name: String,
        attempts: u32,
        last: String,
    },

    /// The pass was abandoned on request
    #[error("Reconcile cancelled")]
    Cancelled,
}

impl Error {
    /// Stable machine-readable reason for status reporting
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Builder(e) => e.reason(),
            Error::Solver(e) => e.reason(),
            Error::Store(e) => e.reason(),
            Error::Config(_) => "InvalidConfiguration",
            Error::Io(_) | Error::Yaml(_) | Error::Json(_) => "InvalidSnapshot",
            Error::RetriesExhausted { .. } => "RetriesExhausted",
            Error::Cancelled => "Cancelled",
        }
    }

    /// Whether retrying the same pass might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_delegates() {
        let err: Error = SolverError::Timeout { budget: 10 }.into();
        assert_eq!(err.reason(), "ResolutionTimeout");
        assert!(!err.is_transient());

        let err: Error = StoreError::Unavailable("down".to_string()).into();
        assert!(err.is_transient());
        assert!(err.to_string().starts_with("Store error"));
    }
}
