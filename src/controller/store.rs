// src/controller/store.rs

//! Fact and status storage
//!
//! The reconciler reads facts and writes Resolution status through two
//! narrow traits. [`MemoryStore`] implements both in process; it backs
//! offline resolution from a [`FactSnapshot`] and can inject write
//! conflicts and outages for testing retry paths.

use crate::api::{FactSnapshot, Input, Resolution, ResolutionStatus};
use crate::builder::CatalogEntity;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency check failed
    #[error("Write conflict on {name}: expected version {expected}, found {found}")]
    Conflict {
        name: String,
        expected: u64,
        found: u64,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Resolution {0} not found")]
    NotFound(String),
}

impl StoreError {
    pub fn reason(&self) -> &'static str {
        match self {
            StoreError::Conflict { .. } => "WriteConflict",
            StoreError::Unavailable(_) => "StoreUnavailable",
            StoreError::NotFound(_) => "NotFound",
        }
    }

    /// Whether a fresh attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Unavailable(_))
    }
}

/// Read side of the fact base
pub trait FactStore: Send + Sync {
    fn list_inputs(&self) -> Result<Vec<Input>, StoreError>;

    fn list_catalog_entities(&self) -> Result<Vec<CatalogEntity>, StoreError>;
}

/// Resolution records with versioned status writes
pub trait ResolutionStore: Send + Sync {
    fn get_resolution(&self, name: &str) -> Result<Resolution, StoreError>;

    fn list_resolution_names(&self) -> Result<Vec<String>, StoreError>;

    /// Replace the status if the record is still at `expected_version`
    ///
    /// Returns the new resource version.
    fn patch_status(
        &self,
        name: &str,
        expected_version: u64,
        status: ResolutionStatus,
    ) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
struct State {
    inputs: Vec<Input>,
    entities: Vec<CatalogEntity>,
    resolutions: BTreeMap<String, Resolution>,
    pending_conflicts: u32,
    pending_outages: u32,
    status_writes: u64,
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: FactSnapshot) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock();
            state.inputs = snapshot.inputs;
            state.entities = snapshot.entities;
            for resolution in snapshot.resolutions {
                state.resolutions.insert(resolution.name.clone(), resolution);
            }
        }
        store
    }

    /// Current contents as a snapshot
    pub fn snapshot(&self) -> FactSnapshot {
        let state = self.state.lock();
        FactSnapshot {
            input_classes: Vec::new(),
            inputs: state.inputs.clone(),
            entities: state.entities.clone(),
            resolutions: state.resolutions.values().cloned().collect(),
        }
    }

    /// Insert an Input or replace the one with the same name
    pub fn upsert_input(&self, input: Input) {
        let mut state = self.state.lock();
        match state.inputs.iter_mut().find(|i| i.name == input.name) {
            Some(existing) => *existing = input,
            None => state.inputs.push(input),
        }
    }

    pub fn remove_input(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.inputs.len();
        state.inputs.retain(|i| i.name != name);
        state.inputs.len() != before
    }

    pub fn set_entities(&self, entities: Vec<CatalogEntity>) {
        self.state.lock().entities = entities;
    }

    /// Insert or replace a Resolution, bumping its version
    pub fn put_resolution(&self, mut resolution: Resolution) {
        let mut state = self.state.lock();
        if let Some(existing) = state.resolutions.get(&resolution.name) {
            resolution.resource_version = existing.resource_version + 1;
        }
        state.resolutions.insert(resolution.name.clone(), resolution);
    }

    pub fn remove_resolution(&self, name: &str) -> bool {
        self.state.lock().resolutions.remove(name).is_some()
    }

    pub fn resolution(&self, name: &str) -> Option<Resolution> {
        self.state.lock().resolutions.get(name).cloned()
    }

    /// Fail the next `count` status writes as if another writer got there first
    pub fn inject_conflicts(&self, count: u32) {
        self.state.lock().pending_conflicts = count;
    }

    /// Fail the next `count` fact reads as unavailable
    pub fn inject_outages(&self, count: u32) {
        self.state.lock().pending_outages = count;
    }

    /// Number of successful status writes so far
    pub fn status_writes(&self) -> u64 {
        self.state.lock().status_writes
    }
}

impl FactStore for MemoryStore {
    fn list_inputs(&self) -> Result<Vec<Input>, StoreError> {
        let mut state = self.state.lock();
        if state.pending_outages > 0 {
            state.pending_outages -= 1;
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(state.inputs.clone())
    }

    fn list_catalog_entities(&self) -> Result<Vec<CatalogEntity>, StoreError> {
        Ok(self.state.lock().entities.clone())
    }
}

impl ResolutionStore for MemoryStore {
    fn get_resolution(&self, name: &str) -> Result<Resolution, StoreError> {
        self.resolution(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn list_resolution_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state.lock().resolutions.keys().cloned().collect())
    }

    fn patch_status(
        &self,
        name: &str,
        expected_version: u64,
        status: ResolutionStatus,
    ) -> Result<u64, StoreError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let inject = state.pending_conflicts > 0;
        if inject {
            state.pending_conflicts -= 1;
        }

        let resolution = state
            .resolutions
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        if inject {
            // Simulate a concurrent writer
            resolution.resource_version += 1;
        }
        if resolution.resource_version != expected_version {
            return Err(StoreError::Conflict {
                name: name.to_string(),
                expected: expected_version,
                found: resolution.resource_version,
            });
        }

        resolution.status = status;
        resolution.resource_version += 1;
        let version = resolution.resource_version;
        state.status_writes += 1;
        debug!("Patched status of {} at version {}", name, version);
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_status_checks_version() {
        let store = MemoryStore::new();
        store.put_resolution(Resolution::new("cluster"));

        let version = store
            .patch_status("cluster", 0, ResolutionStatus::default())
            .unwrap();
        assert_eq!(version, 1);

        let err = store
            .patch_status("cluster", 0, ResolutionStatus::default())
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                name: "cluster".to_string(),
                expected: 0,
                found: 1
            }
        );
        assert!(err.is_transient());
        assert_eq!(store.status_writes(), 1);
    }

    #[test]
    fn test_injected_conflict_bumps_version() {
        let store = MemoryStore::new();
        store.put_resolution(Resolution::new("cluster"));
        store.inject_conflicts(1);

        assert!(store.patch_status("cluster", 0, ResolutionStatus::default()).is_err());
        let current = store.get_resolution("cluster").unwrap().resource_version;
        assert_eq!(current, 1);
        assert_eq!(
            store.patch_status("cluster", current, ResolutionStatus::default()),
            Ok(2)
        );
    }

    #[test]
    fn test_missing_resolution() {
        let store = MemoryStore::new();
        let err = store.get_resolution("nope").unwrap_err();
        assert_eq!(err, StoreError::NotFound("nope".to_string()));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_removed_resolution_is_not_found() {
        let store = MemoryStore::new();
        store.put_resolution(Resolution::new("cluster"));
        assert!(store.remove_resolution("cluster"));
        assert!(!store.remove_resolution("cluster"));
        assert!(store.list_resolution_names().unwrap().is_empty());
        assert_eq!(
            store.patch_status("cluster", 0, ResolutionStatus::default()),
            Err(StoreError::NotFound("cluster".to_string()))
        );
    }

    #[test]
    fn test_injected_outage() {
        let store = MemoryStore::new();
        store.upsert_input(Input::new("a"));
        store.inject_outages(1);
        assert!(matches!(store.list_inputs(), Err(StoreError::Unavailable(_))));
        assert_eq!(store.list_inputs().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut snapshot = FactSnapshot::default();
        snapshot.inputs.push(Input::new("a"));
        snapshot.entities.push(CatalogEntity::new("e").with_property("package", "foo"));
        snapshot.resolutions.push(Resolution::new("cluster"));

        let store = MemoryStore::from_snapshot(snapshot.clone());
        assert_eq!(store.list_resolution_names().unwrap(), vec!["cluster"]);
        assert_eq!(store.list_catalog_entities().unwrap().len(), 1);
        assert_eq!(store.snapshot(), snapshot);

        let yaml = store.snapshot().to_yaml().unwrap();
        assert_eq!(FactSnapshot::from_yaml(&yaml).unwrap(), snapshot);
    }

    #[test]
    fn test_upsert_and_remove_input() {
        let store = MemoryStore::new();
        store.upsert_input(Input::new("a"));
        store.upsert_input(Input::new("a").with_class("core"));
        assert_eq!(store.list_inputs().unwrap()[0].class_name, "core");
        assert!(store.remove_input("a"));
        assert!(!store.remove_input("a"));
    }
}
