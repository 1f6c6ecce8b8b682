// src/lib.rs

//! Deppy bundle resolver
//!
//! Turns a base of declared facts into a consistent, minimal selection of
//! candidates.
//!
//! # Architecture
//!
//! - Facts: Inputs declare at most one requirement intent and any number of
//!   properties; catalog entities add discovered candidates
//! - Variables: every pass rebuilds a flat constraint problem from the facts
//! - Solver: deterministic search with lexical preference and blame on failure
//! - Reconciler: writes the selection (or the failure) back as Resolution
//!   status with optimistic concurrency

pub mod api;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod controller;
mod error;
pub mod solver;

pub use api::{FactSnapshot, Input, Resolution, ResolutionPhase, ResolutionStatus};
pub use builder::{
    build_variables, BuilderError, BuilderOptions, CatalogEntity, Entity, EntityError,
    VariableBuilder,
};
pub use catalog::{mirror_bundle, CatalogBundle};
pub use config::{parse_config_file, parse_config_string, ConfigError, ControllerConfig};
pub use controller::{
    evaluate, resolve, Dispatcher, FactStore, MemoryStore, Reconciler, ResolutionStore,
    RetryPolicy, StoreError,
};
pub use error::{Error, Result};
pub use solver::{
    solve, Constraint, Identifier, Solver, SolverError, SolverOptions, UnsatisfiableError,
    Variable,
};
