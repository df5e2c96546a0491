//! Durable store handle shared by every context of one coordinator.
//!
//! # Responsibility
//! - Own the single SQLite connection and the managed-object model.
//! - Run row operations, wrapping writes in one transaction each.
//! - Queue work that must run on the presentation side (change merges and
//!   batch-delete reconciliation) until the main context is next acquired.
//!
//! # Invariants
//! - All SQL goes through one connection guarded by a mutex.
//! - `write_count` grows by exactly one per committed write transaction.
//! - Presentation events are queued in commit order and stay bounded.

pub mod location;

use crate::context::merge::{PresentationEvent, PresentationQueue};
use crate::model::registry::ObjectModel;
use crate::query::FetchCriteria;
use crate::repo::object_repo::{ObjectRepository, SqliteObjectRepository, StoreError, StoreResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use location::{StorageLocation, StoreLocator, STORE_FILE_EXTENSION};

pub struct Store {
    conn: Mutex<Connection>,
    model: ObjectModel,
    path: Option<PathBuf>,
    writes: AtomicU64,
    presentation: Mutex<PresentationQueue>,
}

impl Store {
    pub(crate) fn new(conn: Connection, model: ObjectModel, path: Option<PathBuf>) -> Self {
        Self {
            conn: Mutex::new(conn),
            model,
            path,
            writes: AtomicU64::new(0),
            presentation: Mutex::new(PresentationQueue::default()),
        }
    }

    pub fn model(&self) -> &ObjectModel {
        &self.model
    }

    /// On-disk file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }

    /// Number of committed write transactions since open.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Presentation events waiting for the main context.
    pub fn queued_presentation_events(&self) -> usize {
        lock_ignoring_poison(&self.presentation).len()
    }

    /// Counts stored rows directly, bypassing every context cache.
    pub fn count_stored(&self, criteria: &FetchCriteria) -> StoreResult<usize> {
        self.read(|repo| repo.count_objects(criteria))
    }

    pub(crate) fn ensure_entity(&self, name: &str) -> StoreResult<()> {
        if self.model.contains(name) {
            Ok(())
        } else {
            Err(StoreError::UnknownEntity(name.to_string()))
        }
    }

    pub(crate) fn read<R>(
        &self,
        work: impl FnOnce(&SqliteObjectRepository<'_>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let conn = self.connection();
        work(&SqliteObjectRepository::new(&conn))
    }

    /// Runs `work` in one transaction; nothing is applied when it fails.
    pub(crate) fn write<R>(
        &self,
        work: impl FnOnce(&SqliteObjectRepository<'_>) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.write_then_publish(work, |_| None)
    }

    /// Like `write`, then queues the event built from the outcome before the
    /// connection is released, so queued events follow commit order.
    pub(crate) fn write_then_publish<R>(
        &self,
        work: impl FnOnce(&SqliteObjectRepository<'_>) -> StoreResult<R>,
        event: impl FnOnce(&R) -> Option<PresentationEvent>,
    ) -> StoreResult<R> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        let outcome = work(&SqliteObjectRepository::new(&tx))?;
        tx.commit()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(event) = event(&outcome) {
            lock_ignoring_poison(&self.presentation).push(event);
        }
        drop(conn);
        Ok(outcome)
    }

    pub(crate) fn drain_presentation_events(&self) -> Vec<PresentationEvent> {
        lock_ignoring_poison(&self.presentation).drain()
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        lock_ignoring_poison(&self.conn)
    }
}

pub(crate) fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
