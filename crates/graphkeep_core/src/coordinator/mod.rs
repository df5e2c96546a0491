//! Persistence coordinator.
//!
//! # Responsibility
//! - Own the durable store, the long-lived main context, and the writer gate.
//! - Run every mutating background operation on a fresh background context,
//!   one at a time, off the async executor.
//! - Publish background saves and batch deletes to the main context.
//!
//! # Invariants
//! - At most one gated operation runs at a time.
//! - A failed open terminates the process after logging.
//! - A cancelled caller never leaves a half-applied operation behind: the
//!   blocking work owns the gate permit and runs to completion.

pub mod cell;
pub mod config;
pub mod entities;
mod reporter;

use crate::context::{Context, ContextKind};
use crate::db::{open_store, open_store_in_memory};
use crate::error::{log_failure, BatchDeleteError, DeleteError, FetchError, InsertError, OpenError};
use crate::model::entity::{Entity, ObjectId, Record};
use crate::query::{BatchDeleteRequest, BatchDeleteResult, FetchRequest, QuerySpec};
use crate::repo::object_repo::{StoreError, StoreResult};
use crate::store::{lock_ignoring_poison, Store};
use config::StoreConfig;
use entities::Entities;
use log::{debug, error, info};
use reporter::LocationReporter;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

const MODULE: &str = "coordinator";

/// Exclusive access to the main context.
pub type MainContext<'a> = MutexGuard<'a, Context>;

pub struct Coordinator {
    store: Arc<Store>,
    main: Arc<Mutex<Context>>,
    gate: Arc<tokio::sync::Mutex<()>>,
    _reporter: Option<LocationReporter>,
}

impl Coordinator {
    /// Opens the configured store.
    ///
    /// There is no recovery path for a store that cannot be opened: the
    /// failure is logged and the process aborts.
    pub fn open(config: StoreConfig) -> Self {
        match Self::try_open(config) {
            Ok(coordinator) => coordinator,
            Err(err) => terminate(&err),
        }
    }

    pub(crate) fn try_open(config: StoreConfig) -> Result<Self, OpenError> {
        let started_at = Instant::now();
        let path = config.resolve_store_path()?;
        let conn = match &path {
            Some(path) => open_store(path, config.value_transformers())?,
            None => open_store_in_memory(config.value_transformers())?,
        };
        let label = path
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |path| path.display().to_string());

        let store = Arc::new(Store::new(conn, config.model().clone(), path));
        let main = Context::new(Arc::clone(&store), ContextKind::Main);
        info!(
            "event=coordinator_open module={MODULE} status=ok location={label} entities={} duration_ms={}",
            store.model().len(),
            started_at.elapsed().as_millis()
        );

        let reporter = cfg!(debug_assertions)
            .then(|| LocationReporter::start(label, config.debug_location_interval()));
        Ok(Self {
            store,
            main: Arc::new(Mutex::new(main)),
            gate: Arc::new(tokio::sync::Mutex::new(())),
            _reporter: reporter,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// On-disk store file; `None` for in-memory stores.
    pub fn store_path(&self) -> Option<&Path> {
        self.store.path()
    }

    /// The presentation context, with queued merges and reconciliations
    /// applied.
    ///
    /// Do not hold the guard across an `.await` on this coordinator.
    pub fn main_context(&self) -> MainContext<'_> {
        let mut main = lock_ignoring_poison(&self.main);
        main.apply_presentation_events();
        main
    }

    /// A fresh short-lived context owned by the caller.
    pub fn background_context(&self) -> Context {
        Context::new(Arc::clone(&self.store), ContextKind::Background)
    }

    /// Typed convenience operations for `T`.
    pub fn entities<T: Entity>(&self) -> Entities<'_, T> {
        Entities::new(self)
    }

    /// Builds one object on a background context and saves it.
    pub async fn insert<T, F>(&self, build: F) -> Result<Record<T>, InsertError>
    where
        T: Entity,
        F: FnOnce(&mut Context) -> StoreResult<Record<T>> + Send + 'static,
    {
        let started_at = Instant::now();
        let mut context = self.background_context();
        let outcome = self
            .confined(move || {
                let record = build(&mut context)?;
                ensure_registered(&context, &record)?;
                context.save()?;
                Ok(record)
            })
            .await;
        match outcome {
            Ok(record) => {
                debug!(
                    "event=insert module={MODULE} status=ok entity={} object_id={} duration_ms={}",
                    T::entity_name(),
                    record.object_id(),
                    started_at.elapsed().as_millis()
                );
                Ok(record)
            }
            Err(err) => Err(log_failure("insert", MODULE, err)),
        }
    }

    /// Builds several objects on one background context and saves them
    /// together.
    pub async fn insert_many<T, F>(&self, build: F) -> Result<Vec<Record<T>>, InsertError>
    where
        T: Entity,
        F: FnOnce(&mut Context) -> StoreResult<Vec<Record<T>>> + Send + 'static,
    {
        let started_at = Instant::now();
        let mut context = self.background_context();
        let outcome = self
            .confined(move || {
                let records = build(&mut context)?;
                for record in &records {
                    ensure_registered(&context, record)?;
                }
                context.save()?;
                Ok(records)
            })
            .await;
        match outcome {
            Ok(records) => {
                debug!(
                    "event=insert_many module={MODULE} status=ok entity={} count={} duration_ms={}",
                    T::entity_name(),
                    records.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(records)
            }
            Err(err) => Err(log_failure("insert_many", MODULE, err)),
        }
    }

    /// Deletes one object, resolved again on a background context.
    pub async fn delete<T: Entity>(&self, record: &Record<T>) -> Result<(), DeleteError> {
        self.delete_many(std::slice::from_ref(record)).await
    }

    /// Deletes several objects in one save.
    ///
    /// Objects that no longer exist are skipped.
    pub async fn delete_many<T: Entity>(&self, records: &[Record<T>]) -> Result<(), DeleteError> {
        let ids: Vec<ObjectId> = records.iter().map(Record::object_id).collect();
        let mut context = self.background_context();
        let outcome = self
            .confined(move || {
                for id in ids {
                    match context.object::<T>(id)? {
                        Some(existing) => context.delete(&existing)?,
                        None => debug!(
                            "event=delete module={MODULE} status=skipped reason=missing_object object_id={id}"
                        ),
                    }
                }
                context.save()?;
                Ok(())
            })
            .await;
        outcome.map_err(|err| log_failure("delete", MODULE, err))
    }

    /// Deletes every object matching `spec` through object-level deletes,
    /// so deletion hooks run. Returns the number of matched objects deleted.
    pub async fn delete_matching<T: Entity>(&self, spec: QuerySpec<T>) -> Result<usize, DeleteError> {
        let mut context = self.background_context();
        let outcome = self
            .confined(move || {
                let records = context.get_all(&spec)?;
                let mut deleted = 0;
                for record in &records {
                    // A deletion hook may already have removed this one.
                    if context.is_registered(record.object_id()) {
                        context.delete(record)?;
                        deleted += 1;
                    }
                }
                context.save()?;
                Ok(deleted)
            })
            .await;
        match outcome {
            Ok(deleted) => {
                debug!(
                    "event=delete_matching module={MODULE} status=ok entity={} deleted={deleted}",
                    T::entity_name()
                );
                Ok(deleted)
            }
            Err(err) => Err(log_failure("delete_matching", MODULE, err)),
        }
    }

    /// Deletes every stored `T` through object-level deletes.
    pub async fn delete_all<T: Entity>(&self) -> Result<usize, DeleteError> {
        self.delete_matching(QuerySpec::<T>::none()).await
    }

    /// Runs an identifier-only delete, then reconciles the main context.
    ///
    /// Deletion hooks do not run. Any fetch limit on the request is ignored.
    pub async fn batch_delete(
        &self,
        request: BatchDeleteRequest,
    ) -> Result<BatchDeleteResult, BatchDeleteError> {
        let started_at = Instant::now();
        let context = self.background_context();
        let outcome = self
            .confined(move || context.batch_delete_and_reconcile(&request))
            .await;
        match outcome {
            Ok(result) => {
                debug!(
                    "event=batch_delete module={MODULE} status=ok result={result:?} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(result)
            }
            Err(err) => Err(log_failure("batch_delete", MODULE, err)),
        }
    }

    /// Fetches fully materialized objects.
    ///
    /// With a caller context the fetch runs inline on it; otherwise on a
    /// gated background context.
    pub async fn fetch<T: Entity>(
        &self,
        mut request: FetchRequest<T>,
        context: Option<&mut Context>,
    ) -> Result<Vec<Record<T>>, FetchError> {
        request.set_returns_objects_as_faults(false);
        let outcome = match context {
            Some(context) => context.fetch(&request),
            None => {
                let mut context = self.background_context();
                self.confined(move || context.fetch(&request)).await
            }
        };
        outcome.map_err(|err| log_failure("fetch", MODULE, err))
    }

    /// Counts matches of `request` on the main context.
    pub fn fetch_count<T: Entity>(&self, request: &FetchRequest<T>) -> Result<usize, FetchError> {
        self.main_context()
            .count(request)
            .map_err(|err| log_failure("fetch_count", MODULE, err))
    }

    /// Counts matches of `spec` on a background context.
    pub async fn fetch_entities_count<T: Entity>(&self, spec: QuerySpec<T>) -> Result<usize, FetchError> {
        let context = self.background_context();
        self.confined(move || context.count_matching(&spec))
            .await
            .map_err(|err| log_failure("fetch_entities_count", MODULE, err))
    }

    /// Batch-deletes every modeled entity on the main context, then resets it.
    ///
    /// Stops at the first failing entity.
    pub async fn destroy_all_data(&self) -> Result<(), BatchDeleteError> {
        let started_at = Instant::now();
        let main = Arc::clone(&self.main);
        let outcome = self
            .confined(move || {
                let mut main = lock_ignoring_poison(&main);
                main.apply_presentation_events();
                let names: Vec<String> = main
                    .store()
                    .model()
                    .entity_names()
                    .map(str::to_string)
                    .collect();
                for entity in names {
                    main.execute_batch_delete(&BatchDeleteRequest::for_entity(entity.as_str()))?;
                }
                main.reset();
                Ok(())
            })
            .await;
        match outcome {
            Ok(()) => {
                info!(
                    "event=destroy_all_data module={MODULE} status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => Err(log_failure("destroy_all_data", MODULE, err)),
        }
    }

    /// Runs `work` on the blocking pool while holding the writer gate.
    async fn confined<R, F>(&self, work: F) -> StoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce() -> StoreResult<R> + Send + 'static,
    {
        let permit = Arc::clone(&self.gate).lock_owned().await;
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(StoreError::Interrupted(err.to_string())),
        }
    }
}

fn ensure_registered<T>(context: &Context, record: &Record<T>) -> StoreResult<()> {
    context.ensure_owner(record)?;
    if context.is_registered(record.object_id()) {
        Ok(())
    } else {
        Err(StoreError::MissingObject(record.object_id()))
    }
}

fn terminate(err: &OpenError) -> ! {
    error!("event=coordinator_open module={MODULE} status=fatal error={err}");
    log::logger().flush();
    std::process::abort()
}
