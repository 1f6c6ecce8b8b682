// src/controller/mod.rs

//! Reconciliation loop
//!
//! A pass reads one Resolution and the whole fact base, rebuilds the
//! variable set, solves it and writes the outcome back as status:
//!
//! ```text
//! get_resolution ─┐
//! list_inputs ────┼─► evaluate ─► patch_status(expected version)
//! list_entities ──┘                    │
//!                                      └─ conflict: re-read everything, retry
//! ```
//!
//! [`evaluate`] is the pure core. [`Reconciler`] adds store I/O, retry of
//! transient failures and cancellation. [`Dispatcher`] serializes passes
//! per Resolution and runs different Resolutions concurrently.

mod dispatch;
mod retry;
mod store;

pub use dispatch::Dispatcher;
pub use retry::{sleep_unless_cancelled, RetryPolicy};
pub use store::{FactStore, MemoryStore, ResolutionStore, StoreError};

use crate::api::{
    set_status_condition, Condition, ConditionStatus, Input, Resolution, ResolutionPhase,
    ResolutionStatus, CONDITION_RESOLVED,
};
use crate::builder::{desired_inputs, CatalogEntity, VariableBuilder};
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::solver::{Identifier, Solver, SolverError, SolverOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Condition reason while no Inputs exist
pub const REASON_NO_RUNTIME_INPUTS: &str = "NoRuntimeInputs";

/// Condition reason after a successful pass
pub const REASON_SUCCESSFUL_RESOLUTION: &str = "SuccessfulResolution";

/// Solve a Resolution against a fact snapshot
///
/// Desired constraints are folded in as synthetic requirement Inputs, which
/// are left out of the returned selection.
pub fn resolve(
    resolution: &Resolution,
    inputs: &[Input],
    entities: &[CatalogEntity],
    builder: &VariableBuilder,
    options: &SolverOptions,
) -> Result<Vec<Identifier>> {
    let desired = desired_inputs(&resolution.name, &resolution.desired_constraints);
    let mut all = Vec::with_capacity(inputs.len() + desired.len());
    all.extend_from_slice(inputs);
    all.extend(desired.iter().cloned());

    let variables = builder.build(&all, entities)?;
    let solver = Solver::with_options(variables, options.clone())?;
    let mut selected = solver.solve()?;
    selected.retain(|id| !desired.iter().any(|d| d.name == id.as_str()));
    Ok(selected)
}

/// Compute the next status of a Resolution
///
/// Errors only when the pass was cancelled; every other failure is folded
/// into a `Failed` status.
pub fn evaluate(
    resolution: &Resolution,
    inputs: &[Input],
    entities: &[CatalogEntity],
    builder: &VariableBuilder,
    options: &SolverOptions,
) -> Result<ResolutionStatus> {
    let mut status = resolution.status.clone();

    if inputs.is_empty() {
        status.phase = ResolutionPhase::Pending;
        status.selected_ids.clear();
        set_status_condition(
            &mut status.conditions,
            Condition::new(
                CONDITION_RESOLVED,
                ConditionStatus::False,
                REASON_NO_RUNTIME_INPUTS,
                "Waiting for Inputs to be defined before performing resolution",
            ),
        );
        return Ok(status);
    }

    debug!(
        "Evaluating {} against {} inputs and {} entities",
        resolution.name,
        inputs.len(),
        entities.len()
    );

    match resolve(resolution, inputs, entities, builder, options) {
        Ok(selected) => {
            status.phase = ResolutionPhase::Resolved;
            status.selected_ids = selected.iter().map(|id| id.to_string()).collect();
            set_status_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_RESOLVED,
                    ConditionStatus::True,
                    REASON_SUCCESSFUL_RESOLUTION,
                    format!("Selected {} of {} inputs", selected.len(), inputs.len()),
                ),
            );
        }
        Err(Error::Cancelled) | Err(Error::Solver(SolverError::Cancelled)) => {
            return Err(Error::Cancelled);
        }
        Err(e) => {
            status.phase = ResolutionPhase::Failed;
            status.selected_ids.clear();
            set_status_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_RESOLVED,
                    ConditionStatus::False,
                    e.reason(),
                    e.to_string(),
                ),
            );
        }
    }
    Ok(status)
}

/// Runs reconcile passes against a store
pub struct Reconciler<S> {
    store: Arc<S>,
    builder: VariableBuilder,
    config: ControllerConfig,
}

impl<S: FactStore + ResolutionStore> Reconciler<S> {
    pub fn new(store: Arc<S>, config: &ControllerConfig) -> Self {
        Self {
            store,
            builder: VariableBuilder::with_options(config.builder_options()),
            config: config.clone(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Bring one Resolution's status up to date with the fact base
    ///
    /// Transient store failures restart the whole pass from a fresh read.
    /// The backoff between tries ends early on cancellation. Returns the
    /// phase that was written.
    pub fn reconcile(&self, name: &str, cancel: &Arc<AtomicBool>) -> Result<ResolutionPhase> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::Cancelled);
            }

            match self.pass(name, cancel) {
                Err(Error::Store(e)) if e.is_transient() => {
                    if !retry.should_retry(attempt) {
                        return Err(Error::RetriesExhausted {
                            name: name.to_string(),
                            attempts: attempt + 1,
                            last: e.to_string(),
                        });
                    }
                    let delay = retry.delay(attempt);
                    warn!(
                        "Reconcile of {} failed: {}; retrying in {:?} (attempt {}/{})",
                        name,
                        e,
                        delay,
                        attempt + 1,
                        retry.max_attempts
                    );
                    if !sleep_unless_cancelled(delay, cancel) {
                        debug!("Retry of {} cancelled during backoff", name);
                        return Err(Error::Cancelled);
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn pass(&self, name: &str, cancel: &Arc<AtomicBool>) -> Result<ResolutionPhase> {
        let resolution = self.store.get_resolution(name)?;
        let inputs = self.store.list_inputs()?;
        let entities = self.store.list_catalog_entities()?;

        let options = self.config.solver_options(Some(Arc::clone(cancel)));
        let status = evaluate(&resolution, &inputs, &entities, &self.builder, &options)?;
        let phase = status.phase;
        let selected = status.selected_ids.len();

        self.store
            .patch_status(name, resolution.resource_version, status)?;

        match phase {
            ResolutionPhase::Failed => warn!("Resolution {} failed", name),
            _ => info!("Resolution {} is {} with {} selected", name, phase, selected),
        }
        Ok(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{find_status_condition, package_version, require_package};

    fn eval(resolution: &Resolution, inputs: &[Input]) -> ResolutionStatus {
        evaluate(
            resolution,
            inputs,
            &[],
            &VariableBuilder::new(),
            &SolverOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_pending_without_inputs() {
        let mut resolution = Resolution::new("cluster");
        resolution.status.selected_ids = vec!["stale".to_string()];
        let status = eval(&resolution, &[]);
        assert_eq!(status.phase, ResolutionPhase::Pending);
        assert!(status.selected_ids.is_empty());
        let condition = find_status_condition(&status.conditions, CONDITION_RESOLVED).unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, REASON_NO_RUNTIME_INPUTS);
    }

    #[test]
    fn test_resolved() {
        let inputs = vec![
            Input::new("B").with_property(package_version("foo", "1.0.0")),
            Input::new("A").with_constraint(require_package("foo")),
        ];
        let status = eval(&Resolution::new("cluster"), &inputs);
        assert_eq!(status.phase, ResolutionPhase::Resolved);
        assert_eq!(status.selected_ids, vec!["A", "B"]);
        let condition = find_status_condition(&status.conditions, CONDITION_RESOLVED).unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.reason, REASON_SUCCESSFUL_RESOLUTION);
    }

    #[test]
    fn test_failure_clears_previous_selection() {
        let mut resolution = Resolution::new("cluster");
        resolution.status.selected_ids = vec!["A".to_string(), "B".to_string()];
        let inputs = vec![Input::new("A").with_constraint(require_package("missing"))];

        let status = eval(&resolution, &inputs);
        assert_eq!(status.phase, ResolutionPhase::Failed);
        assert!(status.selected_ids.is_empty());
        let condition = find_status_condition(&status.conditions, CONDITION_RESOLVED).unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, "Unsatisfiable");
        assert!(condition.message.contains('A'));
    }

    #[test]
    fn test_builder_error_reason() {
        let inputs = vec![
            Input::new("A")
                .with_constraint(require_package("x"))
                .with_constraint(require_package("y")),
        ];
        let status = eval(&Resolution::new("cluster"), &inputs);
        assert_eq!(status.phase, ResolutionPhase::Failed);
        assert_eq!(status.conditions[0].reason, "MultipleConstraintsUnsupported");
    }

    #[test]
    fn test_desired_constraints_select_provider() {
        let resolution = Resolution::new("cluster").with_constraint(require_package("foo"));
        let inputs = vec![
            Input::new("foo.v2").with_property(package_version("foo", "2.0.0")),
            Input::new("foo.v1").with_property(package_version("foo", "1.0.0")),
            Input::new("bar").with_property(package_version("bar", "1.0.0")),
        ];
        let status = eval(&resolution, &inputs);
        assert_eq!(status.phase, ResolutionPhase::Resolved);
        assert_eq!(status.selected_ids, vec!["foo.v1"]);
    }

    #[test]
    fn test_cancelled_is_not_a_status() {
        let inputs = vec![Input::new("A")];
        let options = SolverOptions {
            cancel: Some(Arc::new(AtomicBool::new(true))),
            ..SolverOptions::default()
        };
        let result = evaluate(
            &Resolution::new("cluster"),
            &inputs,
            &[],
            &VariableBuilder::new(),
            &options,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_reconcile_retries_conflicts() {
        let store = Arc::new(MemoryStore::new());
        store.put_resolution(Resolution::new("cluster"));
        store.upsert_input(Input::new("A"));
        store.inject_conflicts(2);

        let config = ControllerConfig {
            retry: RetryPolicy::immediate(3),
            ..ControllerConfig::default()
        };
        let reconciler = Reconciler::new(Arc::clone(&store), &config);
        let cancel = Arc::new(AtomicBool::new(false));

        assert_eq!(reconciler.reconcile("cluster", &cancel).unwrap(), ResolutionPhase::Resolved);
        assert_eq!(store.status_writes(), 1);
    }

    #[test]
    fn test_reconcile_gives_up() {
        let store = Arc::new(MemoryStore::new());
        store.put_resolution(Resolution::new("cluster"));
        store.upsert_input(Input::new("A"));
        store.inject_outages(5);

        let config = ControllerConfig {
            retry: RetryPolicy::immediate(2),
            ..ControllerConfig::default()
        };
        let reconciler = Reconciler::new(Arc::clone(&store), &config);
        let err = reconciler
            .reconcile("cluster", &Arc::new(AtomicBool::new(false)))
            .unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(store.status_writes(), 0);
    }
}
