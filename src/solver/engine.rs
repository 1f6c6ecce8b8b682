// src/solver/engine.rs

//! Resolver implementation
//!
//! Resolution runs in three phases:
//!
//! 1. Mandatory and prohibited variables are fixed up front.
//! 2. Unit propagation runs to a fixpoint over dependency, conflict and
//!    at-most rules, driven by a worklist of rules touching changed variables.
//! 3. If a selected variable still has an open dependency, the smallest
//!    undetermined candidate is tried as selected, then as unselected.
//!
//! The search is iterative: decisions live on an explicit stack and every
//! assignment is recorded on a trail, so backtracking undoes assignments
//! instead of copying state. Depth is bounded only by the step budget.
//!
//! Only candidates of open dependencies are ever branched on. Once every
//! selected variable's dependencies are met, all remaining undetermined
//! variables are left unselected, which can never break a constraint. The
//! result is deterministic for a given variable set regardless of input order.

use super::error::{AppliedConstraint, SolverError, UnsatisfiableError};
use super::{Constraint, Identifier, Variable};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Default number of search decisions before giving up
pub const DEFAULT_STEP_BUDGET: u64 = 100_000;

/// Tunables for a single resolution
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum number of search decisions; 0 disables the budget
    pub step_budget: u64,
    /// Checked before propagation and before every search decision
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            cancel: None,
        }
    }
}

/// Per-variable selection state, indexed like `Solver::variables`
type Assignment = Vec<Option<bool>>;

/// Position of a constraint: (variable index, constraint index)
type Origin = (usize, usize);

/// A constraint compiled against variable positions
#[derive(Debug)]
enum Rule {
    Dependency {
        owner: usize,
        targets: Vec<usize>,
        origin: Origin,
    },
    Conflict {
        owner: usize,
        others: Vec<usize>,
        origin: Origin,
    },
    AtMost {
        n: usize,
        members: Vec<usize>,
        origin: Origin,
    },
}

impl Rule {
    /// Every variable whose assignment can change the rule's outcome
    fn mentions(&self) -> impl Iterator<Item = usize> + '_ {
        let (owner, rest) = match self {
            Rule::Dependency { owner, targets, .. } => (Some(*owner), targets),
            Rule::Conflict { owner, others, .. } => (Some(*owner), others),
            Rule::AtMost { members, .. } => (None, members),
        };
        owner.into_iter().chain(rest.iter().copied())
    }
}

enum Failure {
    Conflict(BTreeSet<AppliedConstraint>),
    Budget,
    Cancelled,
}

/// One open decision on the search stack
struct Frame {
    pivot: usize,
    /// Trail length before the pivot was assigned
    mark: usize,
    /// Blame from the selected branch, set once it has failed
    first: Option<BTreeSet<AppliedConstraint>>,
}

/// Mutable search state
///
/// `open` marks dependency rules whose owner is selected while no target is,
/// `open_refs` counts the open rules naming each variable, and `eligible`
/// holds the undetermined variables with a nonzero count. The next decision
/// is always the first member of `eligible`.
struct SearchState {
    assignment: Assignment,
    /// Assigned variables, oldest first
    trail: Vec<usize>,
    open: Vec<bool>,
    open_refs: Vec<usize>,
    eligible: BTreeSet<usize>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
}

impl SearchState {
    fn new(variables: usize, rules: usize) -> Self {
        Self {
            assignment: vec![None; variables],
            trail: Vec::new(),
            open: vec![false; rules],
            open_refs: vec![0; variables],
            eligible: BTreeSet::new(),
            queue: VecDeque::new(),
            queued: vec![false; rules],
        }
    }

    fn enqueue(&mut self, rule: usize) {
        if !self.queued[rule] {
            self.queued[rule] = true;
            self.queue.push_back(rule);
        }
    }

    fn clear_queue(&mut self) {
        for rule in self.queue.drain(..) {
            self.queued[rule] = false;
        }
    }

    fn update_eligible(&mut self, var: usize) {
        if self.assignment[var].is_none() && self.open_refs[var] > 0 {
            self.eligible.insert(var);
        } else {
            self.eligible.remove(&var);
        }
    }

    fn is_selected(&self, var: usize) -> bool {
        self.assignment[var] == Some(true)
    }
}

/// Deterministic constraint solver over a finite variable set
#[derive(Debug)]
pub struct Solver {
    /// Sorted by identifier, so index order is lexical order
    variables: Vec<Variable>,
    rules: Vec<Rule>,
    /// Rules mentioning each variable, by rule index
    watches: Vec<Vec<usize>>,
    options: SolverOptions,
}

impl Solver {
    /// Create a solver, rejecting duplicate identifiers
    pub fn new(variables: Vec<Variable>) -> Result<Self, SolverError> {
        Self::with_options(variables, SolverOptions::default())
    }

    pub fn with_options(
        mut variables: Vec<Variable>,
        options: SolverOptions,
    ) -> Result<Self, SolverError> {
        variables.sort_by(|a, b| a.id().cmp(b.id()));
        if let Some(pair) = variables.windows(2).find(|w| w[0].id() == w[1].id()) {
            return Err(SolverError::DuplicateVariable {
                id: pair[0].id().clone(),
            });
        }

        let rules = compile(&variables);
        let mut watches = vec![Vec::new(); variables.len()];
        for (idx, rule) in rules.iter().enumerate() {
            for var in rule.mentions() {
                let list: &mut Vec<usize> = &mut watches[var];
                if list.last() != Some(&idx) {
                    list.push(idx);
                }
            }
        }

        Ok(Self {
            variables,
            rules,
            watches,
            options,
        })
    }

    /// Number of variables in the problem
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Find the selection, returned sorted by identifier
    ///
    /// Never returns a partial selection: either every constraint holds for
    /// the returned set, or an error explains why no such set exists.
    pub fn solve(&self) -> Result<Vec<Identifier>, SolverError> {
        debug!(
            "Solving {} variables with {} compiled rules",
            self.variables.len(),
            self.rules.len()
        );
        self.check_cancelled()?;

        let mut state = SearchState::new(self.variables.len(), self.rules.len());
        for (idx, var) in self.variables.iter().enumerate() {
            let mandatory = var.constraints().contains(&Constraint::Mandatory);
            let prohibited = var.constraints().contains(&Constraint::Prohibited);
            match (mandatory, prohibited) {
                (true, true) => {
                    return Err(SolverError::ContradictoryConstraints {
                        id: var.id().clone(),
                    });
                }
                (true, false) => self.assign(&mut state, idx, true),
                (false, true) => self.assign(&mut state, idx, false),
                (false, false) => {}
            }
        }
        for rule in 0..self.rules.len() {
            state.enqueue(rule);
        }

        self.check_cancelled()?;

        let mut steps = 0u64;
        let assignment = match self.search(&mut state, &mut steps) {
            Ok(found) => found,
            Err(Failure::Budget) => {
                return Err(SolverError::Timeout {
                    budget: self.options.step_budget,
                });
            }
            Err(Failure::Cancelled) => return Err(SolverError::Cancelled),
            Err(Failure::Conflict(blame)) => {
                debug!("Resolution unsatisfiable after {} search steps", steps);
                return Err(UnsatisfiableError {
                    constraints: blame.into_iter().collect(),
                }
                .into());
            }
        };
        debug_assert!(self.satisfies(&assignment));

        let selected: Vec<Identifier> = self
            .variables
            .iter()
            .zip(&assignment)
            .filter(|(_, state)| **state == Some(true))
            .map(|(var, _)| var.id().clone())
            .collect();

        debug!(
            "Selected {} of {} variables in {} search steps",
            selected.len(),
            self.variables.len(),
            steps
        );
        Ok(selected)
    }

    fn check_cancelled(&self) -> Result<(), SolverError> {
        match &self.options.cancel {
            Some(token) if token.load(Ordering::Relaxed) => Err(SolverError::Cancelled),
            _ => Ok(()),
        }
    }

    fn search(&self, state: &mut SearchState, steps: &mut u64) -> Result<Assignment, Failure> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut outcome = self.propagate(state);

        loop {
            while let Err(blame) = outcome {
                let Some(frame) = frames.last_mut() else {
                    return Err(Failure::Conflict(blame));
                };
                self.undo_to(state, frame.mark);
                match frame.first.take() {
                    None => {
                        trace!("Backtracking: {} unselected", self.variables[frame.pivot].id());
                        frame.first = Some(blame);
                        let pivot = frame.pivot;
                        self.assign(state, pivot, false);
                        outcome = self.propagate(state);
                    }
                    Some(mut first) => {
                        first.extend(blame);
                        frames.pop();
                        outcome = Err(first);
                    }
                }
            }

            if self.check_cancelled().is_err() {
                return Err(Failure::Cancelled);
            }

            let Some(&pivot) = state.eligible.first() else {
                let mut assignment = std::mem::take(&mut state.assignment);
                for value in assignment.iter_mut().filter(|v| v.is_none()) {
                    *value = Some(false);
                }
                return Ok(assignment);
            };

            *steps += 1;
            if self.options.step_budget > 0 && *steps > self.options.step_budget {
                return Err(Failure::Budget);
            }
            trace!("Trying {} as selected", self.variables[pivot].id());

            frames.push(Frame {
                pivot,
                mark: state.trail.len(),
                first: None,
            });
            self.assign(state, pivot, true);
            outcome = self.propagate(state);
        }
    }

    fn assign(&self, state: &mut SearchState, var: usize, value: bool) {
        state.assignment[var] = Some(value);
        state.trail.push(var);
        self.refresh(state, var);
        for &rule in &self.watches[var] {
            state.enqueue(rule);
        }
    }

    fn undo_to(&self, state: &mut SearchState, mark: usize) {
        while state.trail.len() > mark {
            let Some(var) = state.trail.pop() else {
                break;
            };
            state.assignment[var] = None;
            self.refresh(state, var);
        }
    }

    /// Recompute open dependencies after `var` changed
    fn refresh(&self, state: &mut SearchState, var: usize) {
        for &idx in &self.watches[var] {
            let Rule::Dependency { owner, targets, .. } = &self.rules[idx] else {
                continue;
            };
            let open =
                state.is_selected(*owner) && !targets.iter().any(|t| state.is_selected(*t));
            if open == state.open[idx] {
                continue;
            }
            state.open[idx] = open;
            for &target in targets {
                if open {
                    state.open_refs[target] += 1;
                } else {
                    state.open_refs[target] -= 1;
                }
                state.update_eligible(target);
            }
        }
        state.update_eligible(var);
    }

    fn propagate(&self, state: &mut SearchState) -> Result<(), BTreeSet<AppliedConstraint>> {
        while let Some(idx) = state.queue.pop_front() {
            state.queued[idx] = false;
            if let Err(blame) = self.apply(state, idx) {
                state.clear_queue();
                return Err(blame);
            }
        }
        Ok(())
    }

    /// Enforce one rule against the current assignment
    fn apply(
        &self,
        state: &mut SearchState,
        idx: usize,
    ) -> Result<(), BTreeSet<AppliedConstraint>> {
        match &self.rules[idx] {
            Rule::Dependency {
                owner,
                targets,
                origin,
            } => {
                if !state.is_selected(*owner) || targets.iter().any(|t| state.is_selected(*t)) {
                    return Ok(());
                }
                let mut available = targets.iter().filter(|t| state.assignment[**t].is_none());
                let forced = match (available.next(), available.next()) {
                    (None, _) => return Err(self.blame(*origin)),
                    (Some(&only), None) => Some(only),
                    _ => None,
                };
                if let Some(only) = forced {
                    self.assign(state, only, true);
                }
            }
            Rule::Conflict {
                owner,
                others,
                origin,
            } => match state.assignment[*owner] {
                Some(true) => {
                    for &other in others {
                        let current = state.assignment[other];
                        match current {
                            Some(true) => return Err(self.blame(*origin)),
                            None => self.assign(state, other, false),
                            Some(false) => {}
                        }
                    }
                }
                None => {
                    if others.iter().any(|o| state.is_selected(*o)) {
                        self.assign(state, *owner, false);
                    }
                }
                Some(false) => {}
            },
            Rule::AtMost { n, members, origin } => {
                let count = members.iter().filter(|m| state.is_selected(**m)).count();
                if count > *n {
                    return Err(self.blame(*origin));
                }
                if count == *n {
                    for &member in members {
                        if state.assignment[member].is_none() {
                            self.assign(state, member, false);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn blame(&self, (var, constraint): Origin) -> BTreeSet<AppliedConstraint> {
        let variable = &self.variables[var];
        BTreeSet::from([AppliedConstraint::new(
            variable.id().clone(),
            variable.constraints()[constraint].clone(),
        )])
    }

    /// Check a complete assignment against every constraint
    fn satisfies(&self, assignment: &Assignment) -> bool {
        let selected = |idx: usize| assignment[idx] == Some(true);
        let forced_ok = self.variables.iter().enumerate().all(|(idx, var)| {
            var.constraints().iter().all(|c| match c {
                Constraint::Mandatory => selected(idx),
                Constraint::Prohibited => !selected(idx),
                _ => true,
            })
        });
        forced_ok
            && self.rules.iter().all(|rule| match rule {
                Rule::Dependency { owner, targets, .. } => {
                    !selected(*owner) || targets.iter().any(|t| selected(*t))
                }
                Rule::Conflict { owner, others, .. } => {
                    !selected(*owner) || !others.iter().any(|o| selected(*o))
                }
                Rule::AtMost { n, members, .. } => {
                    members.iter().filter(|m| selected(**m)).count() <= *n
                }
            })
    }
}

/// Resolve a variable set with default options
pub fn solve(variables: Vec<Variable>) -> Result<Vec<Identifier>, SolverError> {
    Solver::new(variables)?.solve()
}

/// Translate identifier references into positions
///
/// Identifiers that name no variable are dropped: they can never be
/// selected, so a dependency on only unknown identifiers is unsatisfiable.
fn compile(variables: &[Variable]) -> Vec<Rule> {
    let position = |id: &Identifier| variables.binary_search_by(|v| v.id().cmp(id)).ok();
    let resolve = |owner: &Identifier, ids: &[Identifier]| -> Vec<usize> {
        let mut resolved: Vec<usize> = ids
            .iter()
            .filter_map(|id| {
                let found = position(id);
                if found.is_none() {
                    debug!("{} references unknown variable {}", owner, id);
                }
                found
            })
            .collect();
        resolved.sort_unstable();
        resolved.dedup();
        resolved
    };

    let mut rules = Vec::new();
    for (owner, var) in variables.iter().enumerate() {
        for (idx, constraint) in var.constraints().iter().enumerate() {
            let origin = (owner, idx);
            match constraint {
                Constraint::Mandatory | Constraint::Prohibited => {}
                Constraint::Dependency(ids) => rules.push(Rule::Dependency {
                    owner,
                    targets: resolve(var.id(), ids),
                    origin,
                }),
                Constraint::Conflict(ids) => rules.push(Rule::Conflict {
                    owner,
                    others: resolve(var.id(), ids),
                    origin,
                }),
                Constraint::AtMost { n, ids } => rules.push(Rule::AtMost {
                    n: *n,
                    members: resolve(var.id(), ids),
                    origin,
                }),
            }
        }
    }
    rules
}
