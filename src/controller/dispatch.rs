// src/controller/dispatch.rs

//! Per-Resolution work queues
//!
//! Each Resolution name gets a bounded channel drained by its own worker
//! task, so passes for one record never overlap while different records
//! reconcile concurrently. The pass itself is synchronous and runs on the
//! blocking pool.
//!
//! A trigger carries no payload: every pass recomputes from a fresh read.
//! When a queue is full the trigger is dropped, since the one already
//! queued will observe the same facts.
//!
//! A worker whose Resolution no longer exists removes itself from the map
//! and exits. A later trigger for the same name starts a fresh worker.

use super::{FactStore, Reconciler, ResolutionStore, StoreError};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Worker {
    tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

type WorkerMap = Arc<Mutex<HashMap<String, Worker>>>;

/// Routes change notifications to per-Resolution workers
pub struct Dispatcher<S> {
    reconciler: Arc<Reconciler<S>>,
    capacity: usize,
    cancel: Arc<AtomicBool>,
    workers: WorkerMap,
}

impl<S: FactStore + ResolutionStore + 'static> Dispatcher<S> {
    /// Create a dispatcher buffering up to `capacity` triggers per record
    ///
    /// A capacity of 0 is treated as 1.
    pub fn new(reconciler: Reconciler<S>, capacity: usize) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            capacity: capacity.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Token shared by every pass this dispatcher starts
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Queue a pass for one Resolution
    ///
    /// Returns false when the trigger was coalesced into one already queued
    /// or the dispatcher is shutting down. Must be called from within a
    /// tokio runtime.
    pub fn notify(&self, name: &str) -> bool {
        if self.cancel.load(Ordering::SeqCst) {
            return false;
        }

        let mut workers = self.workers.lock();
        let worker = workers
            .entry(name.to_string())
            .or_insert_with(|| self.spawn_worker(name));

        match worker.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Coalesced trigger for {}", name);
                false
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("Worker for {} has stopped, restarting", name);
                let fresh = self.spawn_worker(name);
                let queued = fresh.tx.try_send(()).is_ok();
                *worker = fresh;
                queued
            }
        }
    }

    /// Number of live per-Resolution workers
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Queue a pass for every known Resolution
    ///
    /// Returns how many triggers were queued.
    pub fn inputs_changed(&self) -> Result<usize> {
        let names = self.reconciler.store().list_resolution_names()?;
        Ok(names.iter().filter(|name| self.notify(name)).count())
    }

    fn spawn_worker(&self, name: &str) -> Worker {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = tokio::spawn(run_worker(
            name.to_string(),
            rx,
            Arc::clone(&self.reconciler),
            Arc::clone(&self.cancel),
            Arc::clone(&self.workers),
        ));
        debug!("Started worker for {}", name);
        Worker { tx, handle }
    }

    /// Stop accepting triggers and wait for queued passes to finish
    pub async fn close(self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        let count = workers.len();
        for (name, worker) in workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                warn!("Worker for {} ended abnormally: {}", name, e);
            }
        }
        info!("Dispatcher closed {} workers", count);
    }

    /// Cancel in-flight passes, drop queued ones and wait for workers
    pub async fn shutdown(self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.close().await;
    }
}

async fn run_worker<S: FactStore + ResolutionStore + 'static>(
    name: String,
    mut rx: mpsc::Receiver<()>,
    reconciler: Arc<Reconciler<S>>,
    cancel: Arc<AtomicBool>,
    workers: WorkerMap,
) {
    let mut pending = rx.recv().await.is_some();
    while pending {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let reconciler = Arc::clone(&reconciler);
        let token = Arc::clone(&cancel);
        let record = name.clone();
        let outcome =
            tokio::task::spawn_blocking(move || reconciler.reconcile(&record, &token)).await;

        match outcome {
            Ok(Ok(phase)) => debug!("Reconciled {} to {}", name, phase),
            Ok(Err(Error::Cancelled)) => {
                debug!("Reconcile of {} cancelled", name);
                break;
            }
            Ok(Err(Error::Store(StoreError::NotFound(_)))) => {
                // Triggers are sent under the same lock, so an empty queue
                // here means nobody is waiting on this worker
                let mut map = workers.lock();
                if rx.try_recv().is_ok() {
                    drop(map);
                    continue;
                }
                map.remove(&name);
                debug!("Resolution {} is gone, stopping its worker", name);
                break;
            }
            Ok(Err(e)) => warn!("Reconcile of {} failed: {}", name, e),
            Err(e) => warn!("Reconcile task for {} panicked: {}", name, e),
        }
        pending = rx.recv().await.is_some();
    }
}
