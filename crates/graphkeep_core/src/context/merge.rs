//! Merge and reconciliation policy for the main (presentation) context.
//!
//! # Responsibility
//! - Describe what a background save changed, so the main context can absorb
//!   it without refetching.
//! - Drive reconciliation after batch deletes, which bypass contexts.
//!
//! # Invariants
//! - Per-property "local wins": a property edited in memory and not yet saved
//!   keeps its local value; every other property takes the store value.
//! - Reconciliation mutates the main context and therefore only runs where
//!   the main context is held.

use super::Context;
use crate::model::entity::ObjectId;
use crate::query::BatchDeleteResult;
use log::{debug, error};
use serde_json::{Map, Value as JsonValue};
use std::collections::VecDeque;

/// Upper bound on queued presentation work, counted in events plus changed
/// identities. Past it the queue collapses into one full reconciliation.
pub const MAX_QUEUED_CHANGES: usize = 512;

/// Store values of one object after a save.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedObject {
    pub object_id: ObjectId,
    pub unique_id: Option<String>,
    pub data: Map<String, JsonValue>,
}

/// Outcome of one committed save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub inserted: Vec<ObjectId>,
    pub updated: Vec<ChangedObject>,
    pub deleted: Vec<ObjectId>,
}

impl ChangeSet {
    pub fn deletions(deleted: Vec<ObjectId>) -> Self {
        Self {
            deleted,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    /// Folds a later change set into this one; later values replace earlier
    /// ones for the same object.
    pub fn absorb(&mut self, later: ChangeSet) {
        self.updated.retain(|earlier| {
            !later.deleted.contains(&earlier.object_id)
                && !later
                    .updated
                    .iter()
                    .any(|changed| changed.object_id == earlier.object_id)
        });
        self.inserted.retain(|id| !later.deleted.contains(id));
        self.inserted.extend(later.inserted);
        self.updated.extend(later.updated);
        self.deleted.extend(later.deleted);
    }
}

/// Reconciliation state of the main context around a batch delete.
///
/// `Clean` -> `BatchDeleted` -> `Clean`. `deleted` is `None` when the store
/// could not report which identities it removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileState {
    Clean,
    BatchDeleted { deleted: Option<Vec<ObjectId>> },
}

impl ReconcileState {
    pub fn after_batch_delete(result: &BatchDeleteResult) -> Self {
        Self::BatchDeleted {
            deleted: result.deleted_ids().map(<[ObjectId]>::to_vec),
        }
    }

    /// Combines two pending reconciliations. Any step without identities
    /// turns the whole result into a full reset.
    fn absorb(&mut self, later: ReconcileState) {
        *self = match (std::mem::replace(self, Self::Clean), later) {
            (Self::Clean, later) => later,
            (earlier, Self::Clean) => earlier,
            (
                Self::BatchDeleted {
                    deleted: Some(mut earlier),
                },
                Self::BatchDeleted {
                    deleted: Some(later),
                },
            ) => {
                earlier.extend(later);
                Self::BatchDeleted {
                    deleted: Some(earlier),
                }
            }
            _ => Self::full_reset(),
        };
    }

    fn full_reset() -> Self {
        Self::BatchDeleted { deleted: None }
    }

    fn len(&self) -> usize {
        match self {
            Self::BatchDeleted {
                deleted: Some(deleted),
            } => deleted.len(),
            Self::Clean | Self::BatchDeleted { deleted: None } => 0,
        }
    }

    /// Brings `main` back in line with the store and returns `Clean`.
    ///
    /// Reported identities are evicted directly. Without them the fallback
    /// saves pending main-context changes (failures are logged, never
    /// propagated) and resets the whole in-memory cache.
    pub fn apply(self, main: &mut Context) -> Self {
        match self {
            Self::Clean => Self::Clean,
            Self::BatchDeleted {
                deleted: Some(deleted),
            } => {
                debug!(
                    "event=reconcile module=context status=ok mode=merge_ids count={}",
                    deleted.len()
                );
                main.merge_changes(&ChangeSet::deletions(deleted));
                Self::Clean
            }
            Self::BatchDeleted { deleted: None } => {
                if main.has_changes() {
                    if let Err(err) = main.save() {
                        error!(
                            "event=reconcile module=context status=error mode=reset error_code=main_save_failed error={err}"
                        );
                    }
                }
                main.reset();
                debug!("event=reconcile module=context status=ok mode=reset");
                Self::Clean
            }
        }
    }
}

/// Work queued for the presentation side of a store.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    /// A background context saved; absorb its changes.
    Merge(ChangeSet),
    /// A batch delete ran; reconcile the main context.
    Reconcile(ReconcileState),
}

impl PresentationEvent {
    fn len(&self) -> usize {
        match self {
            Self::Merge(changes) => changes.len(),
            Self::Reconcile(state) => state.len(),
        }
    }

    fn is_noop(&self) -> bool {
        match self {
            Self::Merge(changes) => changes.is_empty(),
            Self::Reconcile(state) => *state == ReconcileState::Clean,
        }
    }
}

/// Presentation work waiting for the main context.
///
/// Adjacent events of one kind are coalesced, and once the queue passes
/// `MAX_QUEUED_CHANGES` it is replaced by a single full reconciliation, so
/// its size stays bounded however long the main context goes unacquired.
#[derive(Debug, Default)]
pub(crate) struct PresentationQueue {
    events: VecDeque<PresentationEvent>,
}

impl PresentationQueue {
    pub(crate) fn push(&mut self, event: PresentationEvent) {
        if event.is_noop() || self.ends_with_full_reset() {
            return;
        }
        let unmerged = match (self.events.back_mut(), event) {
            (Some(PresentationEvent::Merge(pending)), PresentationEvent::Merge(changes)) => {
                pending.absorb(changes);
                None
            }
            (Some(PresentationEvent::Reconcile(pending)), PresentationEvent::Reconcile(state)) => {
                pending.absorb(state);
                None
            }
            (_, event) => Some(event),
        };
        if let Some(event) = unmerged {
            self.events.push_back(event);
        }

        let size = self.events.len() + self.events.iter().map(PresentationEvent::len).sum::<usize>();
        if size > MAX_QUEUED_CHANGES {
            debug!(
                "event=presentation_queue module=context status=collapsed events={} size={size}",
                self.events.len()
            );
            self.events.clear();
            self.events
                .push_back(PresentationEvent::Reconcile(ReconcileState::full_reset()));
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<PresentationEvent> {
        self.events.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    fn ends_with_full_reset(&self) -> bool {
        matches!(
            self.events.back(),
            Some(PresentationEvent::Reconcile(ReconcileState::BatchDeleted { deleted: None }))
        )
    }
}

/// Overlays locally edited properties of `current` onto `incoming`.
///
/// A property counts as locally edited when it differs from `committed`, the
/// last store snapshot the context saw. With no snapshot every local property
/// is an edit.
pub(crate) fn merge_local_wins(
    incoming: &Map<String, JsonValue>,
    committed: Option<&Map<String, JsonValue>>,
    current: &Map<String, JsonValue>,
) -> Map<String, JsonValue> {
    let mut merged = incoming.clone();
    let Some(committed) = committed else {
        for (key, value) in current {
            merged.insert(key.clone(), value.clone());
        }
        return merged;
    };

    for key in current.keys().chain(committed.keys()) {
        let local = current.get(key);
        if local == committed.get(key) {
            continue;
        }
        match local {
            Some(value) => {
                merged.insert(key.clone(), value.clone());
            }
            None => {
                merged.remove(key);
            }
        }
    }
    merged
}
