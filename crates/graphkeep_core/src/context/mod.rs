//! Unit-of-work contexts.
//!
//! # Responsibility
//! - Track the objects registered in one session (identity map).
//! - Stage inserts, updates, and deletes and commit them in one transaction.
//! - Offer the typed fetch helpers every higher layer shares.
//!
//! # Invariants
//! - A context is never shared across threads: it is `Send` but not `Sync`,
//!   and every mutating call takes `&mut self`.
//! - `save` is a no-op, with no store write, when nothing is pending.
//! - `reset` discards in-memory state only; the store is untouched.
//! - Queries evaluate against saved state; unsaved inserts become visible to
//!   queries once saved, pending deletes are hidden immediately.

pub mod merge;

use crate::error::{log_failure, SaveError};
use crate::model::entity::{Entity, ObjectId, Record};
use crate::query::{
    BatchDeleteRequest, BatchDeleteResult, BatchDeleteResultType, FetchCriteria, FetchRequest,
    NativePredicate, QuerySpec,
};
use crate::repo::object_repo::{ObjectRepository, ObjectRow, StoreError, StoreResult};
use crate::store::Store;
use log::{debug, error};
use merge::{merge_local_wins, ChangeSet, ChangedObject, PresentationEvent, ReconcileState};
use rusqlite::types::Value;
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;
use std::cell::Cell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-unique context identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// Long-lived presentation context; absorbs background saves.
    Main,
    /// Short-lived context owned by one operation.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectState {
    Clean,
    Inserted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone)]
struct Tracked {
    entity: String,
    unique_id: Option<String>,
    current: Map<String, JsonValue>,
    /// Last store snapshot seen; `None` until the object is first saved.
    committed: Option<Map<String, JsonValue>>,
    state: ObjectState,
}

impl Tracked {
    fn from_row(row: ObjectRow) -> Self {
        Self {
            entity: row.entity,
            unique_id: row.unique_id,
            current: row.data.clone(),
            committed: Some(row.data),
            state: ObjectState::Clean,
        }
    }

    fn to_row(&self, object_id: ObjectId, data: Map<String, JsonValue>) -> ObjectRow {
        ObjectRow {
            object_id,
            entity: self.entity.clone(),
            unique_id: self.unique_id.clone(),
            data,
        }
    }

    fn is_live(&self) -> bool {
        self.state != ObjectState::Deleted
    }

    /// Takes newer store values, keeping unsaved local edits.
    fn absorb_store_values(&mut self, data: &Map<String, JsonValue>, unique_id: Option<&str>) {
        self.current = merge_local_wins(data, self.committed.as_ref(), &self.current);
        if self.state == ObjectState::Clean {
            self.unique_id = unique_id.map(str::to_string);
        }
        self.committed = Some(data.clone());
        self.settle();
    }

    fn settle(&mut self) {
        if self.state == ObjectState::Updated && self.committed.as_ref() == Some(&self.current) {
            self.state = ObjectState::Clean;
        }
    }
}

/// Unit-of-work session over one store.
pub struct Context {
    id: ContextId,
    kind: ContextKind,
    store: Arc<Store>,
    objects: HashMap<ObjectId, Tracked>,
    _not_sync: PhantomData<Cell<()>>,
}

impl Context {
    pub(crate) fn new(store: Arc<Store>, kind: ContextKind) -> Self {
        Self {
            id: ContextId::next(),
            kind,
            store,
            objects: HashMap::new(),
            _not_sync: PhantomData,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Whether `id` is live in this context's identity map.
    pub fn is_registered(&self, id: ObjectId) -> bool {
        self.objects.get(&id).is_some_and(Tracked::is_live)
    }

    /// Number of live objects in the identity map.
    pub fn registered_count(&self) -> usize {
        self.objects.values().filter(|tracked| tracked.is_live()).count()
    }

    pub fn has_changes(&self) -> bool {
        self.objects
            .values()
            .any(|tracked| tracked.state != ObjectState::Clean)
    }

    /// Registers a new object; it reaches the store on the next `save`.
    pub fn insert<T: Entity>(&mut self, value: T) -> StoreResult<Record<T>> {
        let entity = T::entity_name();
        self.store.ensure_entity(&entity)?;
        let current = encode(&entity, &value)?;
        let object_id = ObjectId::generate();
        self.objects.insert(
            object_id,
            Tracked {
                entity,
                unique_id: value.unique_id().map(str::to_string),
                current,
                committed: None,
                state: ObjectState::Inserted,
            },
        );
        Ok(Record::new(object_id, self.id, value))
    }

    /// Stages the record's current value. Returns `false` when nothing changed.
    pub fn update<T: Entity>(&mut self, record: &Record<T>) -> StoreResult<bool> {
        self.ensure_owner(record)?;
        let object_id = record.object_id();
        let tracked = self
            .objects
            .get_mut(&object_id)
            .filter(|tracked| tracked.is_live())
            .ok_or(StoreError::MissingObject(object_id))?;

        let encoded = encode(&tracked.entity, record.value())?;
        let unique_id = record.unique_id().map(str::to_string);
        if tracked.current == encoded && tracked.unique_id == unique_id {
            return Ok(false);
        }

        tracked.current = encoded;
        tracked.unique_id = unique_id;
        if tracked.state == ObjectState::Clean {
            tracked.state = ObjectState::Updated;
        }
        tracked.settle();
        Ok(true)
    }

    /// Stages an object-level delete, running the entity's deletion hook first.
    pub fn delete<T: Entity>(&mut self, record: &Record<T>) -> StoreResult<()> {
        self.ensure_owner(record)?;
        let object_id = record.object_id();
        if !self.is_registered(object_id) {
            return Err(StoreError::MissingObject(object_id));
        }
        record.value().prepare_for_deletion(self)?;
        self.stage_delete(object_id);
        Ok(())
    }

    /// Re-resolves `id` in this context, loading it from the store if needed.
    ///
    /// Returns `None` when the object does not exist, is pending deletion, or
    /// belongs to another entity.
    pub fn object<T: Entity>(&mut self, id: ObjectId) -> StoreResult<Option<Record<T>>> {
        let entity = T::entity_name();
        if let Some(tracked) = self.objects.get(&id) {
            if !tracked.is_live() || tracked.entity != entity {
                return Ok(None);
            }
            return self.materialize(id).map(Some);
        }

        let Some(row) = self.store.read(|repo| repo.get_object(id))? else {
            return Ok(None);
        };
        if row.entity != entity {
            return Ok(None);
        }
        self.objects.insert(id, Tracked::from_row(row));
        self.materialize(id).map(Some)
    }

    /// Executes a native fetch request and registers every result.
    pub fn fetch<T: Entity>(&mut self, request: &FetchRequest<T>) -> StoreResult<Vec<Record<T>>> {
        self.store.ensure_entity(request.entity_name())?;
        let criteria = self.visible_criteria(request.criteria());
        let rows = self.store.read(|repo| repo.select_objects(&criteria))?;
        let refresh = !request.returns_objects_as_faults();

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let object_id = row.object_id;
            match self.objects.entry(object_id) {
                Entry::Occupied(mut entry) => {
                    let tracked = entry.get_mut();
                    if !tracked.is_live() {
                        continue;
                    }
                    if refresh {
                        tracked.absorb_store_values(&row.data, row.unique_id.as_deref());
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(Tracked::from_row(row));
                }
            }
            ids.push(object_id);
        }

        ids.into_iter().map(|id| self.materialize(id)).collect()
    }

    /// Counts stored matches of a native fetch request, excluding objects
    /// pending deletion in this context.
    pub fn count<T: Entity>(&self, request: &FetchRequest<T>) -> StoreResult<usize> {
        self.store.ensure_entity(request.entity_name())?;
        let criteria = self.visible_criteria(request.criteria());
        self.store.read(|repo| repo.count_objects(&criteria))
    }

    /// First match of `spec`, or `None` when nothing matches.
    pub fn get_first<T: Entity>(&mut self, spec: &QuerySpec<T>) -> StoreResult<Option<Record<T>>> {
        Ok(self.fetch(&T::fetch_request(spec))?.into_iter().next())
    }

    pub fn get_all<T: Entity>(&mut self, spec: &QuerySpec<T>) -> StoreResult<Vec<Record<T>>> {
        self.fetch(&T::fetch_request(spec))
    }

    pub fn count_matching<T: Entity>(&self, spec: &QuerySpec<T>) -> StoreResult<usize> {
        self.count(&T::fetch_request(spec))
    }

    /// First match of `spec`, or a freshly inserted default record.
    pub fn get_or_init<T: Entity + Default>(&mut self, spec: &QuerySpec<T>) -> StoreResult<Record<T>> {
        match self.get_first(spec)? {
            Some(record) => Ok(record),
            None => T::init(self),
        }
    }

    /// Commits pending changes in one transaction.
    ///
    /// Returns `false` without touching the store when nothing is pending.
    /// Updates merge with the stored row property by property, local edits
    /// winning. On failure nothing is applied and the pending state is kept.
    pub fn save(&mut self) -> StoreResult<bool> {
        if !self.has_changes() {
            return Ok(false);
        }
        let started_at = Instant::now();

        let pending: Vec<(ObjectId, Tracked)> = self
            .objects
            .iter()
            .filter(|(_, tracked)| tracked.state != ObjectState::Clean)
            .map(|(id, tracked)| (*id, tracked.clone()))
            .collect();

        let publishes = self.kind == ContextKind::Background;
        let outcome = pending
            .iter()
            .try_for_each(|(_, tracked)| self.store.ensure_entity(&tracked.entity))
            .and_then(|()| {
                self.store.write_then_publish(
                    |repo| write_pending(repo, &pending),
                    |written| {
                        publishes
                            .then(|| PresentationEvent::Merge(change_set(&pending, written)))
                    },
                )
            });
        let written = match outcome {
            Ok(written) => written,
            Err(err) => {
                error!(
                    "event=context_save module=context status=error context={} duration_ms={} error={}",
                    self.id,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };

        let changes = change_set(&pending, &written);
        for (object_id, tracked) in &pending {
            if tracked.state == ObjectState::Deleted {
                self.objects.remove(object_id);
            }
        }
        for (object_id, data) in written {
            if let Some(tracked) = self.objects.get_mut(&object_id) {
                tracked.current = data.clone();
                tracked.committed = Some(data);
                tracked.state = ObjectState::Clean;
            }
        }

        debug!(
            "event=context_save module=context status=ok context={} inserted={} updated={} deleted={} duration_ms={}",
            self.id,
            changes.inserted.len(),
            changes.updated.len(),
            changes.deleted.len(),
            started_at.elapsed().as_millis()
        );
        Ok(true)
    }

    /// Discards every registered object and pending change.
    pub fn reset(&mut self) {
        self.objects.clear();
    }

    /// Runs an identifier-only delete directly in the store.
    ///
    /// Registered objects are not touched; callers reconcile afterwards.
    pub fn execute_batch_delete(&self, request: &BatchDeleteRequest) -> StoreResult<BatchDeleteResult> {
        self.run_batch_delete(request, false)
    }

    /// Runs an identifier-only delete and queues the matching reconciliation
    /// for the main context in commit order.
    pub(crate) fn batch_delete_and_reconcile(
        &self,
        request: &BatchDeleteRequest,
    ) -> StoreResult<BatchDeleteResult> {
        self.run_batch_delete(request, true)
    }

    fn run_batch_delete(&self, request: &BatchDeleteRequest, reconcile: bool) -> StoreResult<BatchDeleteResult> {
        let criteria = request.criteria();
        self.store.ensure_entity(criteria.entity())?;
        if let Some(limit) = criteria.limit() {
            debug!(
                "event=batch_delete module=context status=limit_ignored entity={} limit={limit}",
                criteria.entity()
            );
        }

        let result_type = request.result_type();
        let result = self.store.write_then_publish(
            |repo| {
                let deleted = repo.batch_delete(criteria)?;
                Ok(match result_type {
                    BatchDeleteResultType::StatusOnly => BatchDeleteResult::Status(!deleted.is_empty()),
                    BatchDeleteResultType::Count => BatchDeleteResult::Count(deleted.len()),
                    BatchDeleteResultType::ObjectIds => BatchDeleteResult::ObjectIds(deleted),
                })
            },
            |result| {
                reconcile.then(|| {
                    PresentationEvent::Reconcile(ReconcileState::after_batch_delete(result))
                })
            },
        )?;
        debug!(
            "event=batch_delete module=context status=ok entity={} result={result:?}",
            criteria.entity()
        );
        Ok(result)
    }

    /// Absorbs changes saved elsewhere: deleted objects are evicted, updated
    /// ones take store values except for unsaved local edits.
    pub fn merge_changes(&mut self, changes: &ChangeSet) {
        for object_id in &changes.deleted {
            self.objects.remove(object_id);
        }
        for changed in &changes.updated {
            if let Some(tracked) = self.objects.get_mut(&changed.object_id) {
                if tracked.is_live() {
                    tracked.absorb_store_values(&changed.data, changed.unique_id.as_deref());
                }
            }
        }
    }

    /// Applies work queued for the presentation side.
    pub(crate) fn apply_presentation_events(&mut self) {
        for event in self.store.drain_presentation_events() {
            match event {
                PresentationEvent::Merge(changes) => self.merge_changes(&changes),
                PresentationEvent::Reconcile(state) => {
                    state.apply(self);
                }
            }
        }
    }

    pub(crate) fn ensure_owner<T>(&self, record: &Record<T>) -> StoreResult<()> {
        if record.context_id() == self.id {
            Ok(())
        } else {
            Err(StoreError::ForeignContext {
                record: record.context_id(),
                context: self.id,
            })
        }
    }

    /// Narrows `criteria` so rows pending deletion here never match, before
    /// any limit applies.
    fn visible_criteria<'a>(&self, criteria: &'a FetchCriteria) -> Cow<'a, FetchCriteria> {
        let hidden: Vec<Value> = self
            .objects
            .iter()
            .filter(|(_, tracked)| {
                tracked.state == ObjectState::Deleted && tracked.entity == criteria.entity()
            })
            .map(|(object_id, _)| Value::Text(object_id.to_string()))
            .collect();
        if hidden.is_empty() {
            return Cow::Borrowed(criteria);
        }

        let placeholders = vec!["?"; hidden.len()].join(", ");
        let exclusion = NativePredicate::new(format!("object_id NOT IN ({placeholders})"), hidden);
        let predicate = match criteria.predicate() {
            Some(predicate) => predicate.clone().and(exclusion),
            None => exclusion,
        };
        Cow::Owned(criteria.clone().with_predicate(predicate))
    }

    fn stage_delete(&mut self, object_id: ObjectId) {
        let Some(tracked) = self.objects.get_mut(&object_id) else {
            return;
        };
        if tracked.state == ObjectState::Inserted {
            self.objects.remove(&object_id);
        } else {
            tracked.state = ObjectState::Deleted;
        }
    }

    fn materialize<T: Entity>(&self, object_id: ObjectId) -> StoreResult<Record<T>> {
        let tracked = self
            .objects
            .get(&object_id)
            .ok_or(StoreError::MissingObject(object_id))?;
        let value = serde_json::from_value(JsonValue::Object(tracked.current.clone()))?;
        Ok(Record::new(object_id, self.id, value))
    }
}

/// Describes a committed save for other contexts.
fn change_set(
    pending: &[(ObjectId, Tracked)],
    written: &[(ObjectId, Map<String, JsonValue>)],
) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for (object_id, tracked) in pending {
        match tracked.state {
            ObjectState::Deleted => changes.deleted.push(*object_id),
            ObjectState::Inserted => changes.inserted.push(*object_id),
            ObjectState::Updated => {
                if let Some((_, data)) = written.iter().find(|(id, _)| id == object_id) {
                    changes.updated.push(ChangedObject {
                        object_id: *object_id,
                        unique_id: tracked.unique_id.clone(),
                        data: data.clone(),
                    });
                }
            }
            ObjectState::Clean => {}
        }
    }
    changes
}

fn write_pending<R: ObjectRepository>(
    repo: &R,
    pending: &[(ObjectId, Tracked)],
) -> StoreResult<Vec<(ObjectId, Map<String, JsonValue>)>> {
    let mut written = Vec::new();
    for (object_id, tracked) in pending {
        match tracked.state {
            ObjectState::Inserted => {
                repo.insert_object(&tracked.to_row(*object_id, tracked.current.clone()))?;
                written.push((*object_id, tracked.current.clone()));
            }
            ObjectState::Updated => {
                let stored = repo
                    .get_object(*object_id)?
                    .ok_or(StoreError::MissingObject(*object_id))?;
                let merged =
                    merge_local_wins(&stored.data, tracked.committed.as_ref(), &tracked.current);
                repo.update_object(&tracked.to_row(*object_id, merged.clone()))?;
                written.push((*object_id, merged));
            }
            ObjectState::Deleted => {
                repo.delete_object(*object_id)?;
            }
            ObjectState::Clean => {}
        }
    }
    Ok(written)
}

fn encode<T: Entity>(entity: &str, value: &T) -> StoreResult<Map<String, JsonValue>> {
    match serde_json::to_value(value)? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject(entity.to_string())),
    }
}

impl<T: Entity> Record<T> {
    /// Saves the owning context if it has pending changes.
    ///
    /// Returns `Ok(false)` when nothing was pending; repeated calls without
    /// intervening edits never write.
    pub fn save(&self, context: &mut Context) -> Result<bool, SaveError> {
        context
            .ensure_owner(self)
            .and_then(|()| context.save())
            .map_err(|err| log_failure("record_save", "context", err))
    }

    /// Stages this record's current value, then saves the owning context.
    pub fn update(&self, context: &mut Context) -> Result<bool, SaveError> {
        context
            .update(self)
            .and_then(|_| context.save())
            .map_err(|err| log_failure("record_update", "context", err))
    }
}
