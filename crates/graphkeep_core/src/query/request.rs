//! Native fetch and batch-delete requests.

use super::native::{NativePredicate, NativeSort};
use crate::model::entity::{Entity, ObjectId};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

/// Untyped native criteria: entity, predicate, sort terms, limit.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCriteria {
    entity: String,
    predicate: Option<NativePredicate>,
    sort: Vec<NativeSort>,
    limit: Option<usize>,
}

impl FetchCriteria {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            sort: Vec::new(),
            limit: None,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn predicate(&self) -> Option<&NativePredicate> {
        self.predicate.as_ref()
    }

    pub fn sort(&self) -> &[NativeSort] {
        &self.sort
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn with_predicate(mut self, predicate: NativePredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_sort(mut self, sort: impl IntoIterator<Item = NativeSort>) -> Self {
        self.sort = sort.into_iter().collect();
        self
    }

    /// Caps the number of matches; `0` means unlimited.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = effective_limit(Some(limit));
        self
    }
}

fn effective_limit(limit: Option<usize>) -> Option<usize> {
    limit.filter(|&limit| limit > 0)
}

/// Native fetch request for record type `T`.
pub struct FetchRequest<T> {
    criteria: FetchCriteria,
    returns_objects_as_faults: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FetchRequest<T> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            returns_objects_as_faults: self.returns_objects_as_faults,
            _marker: PhantomData,
        }
    }
}

impl<T> Debug for FetchRequest<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("criteria", &self.criteria)
            .field("returns_objects_as_faults", &self.returns_objects_as_faults)
            .finish()
    }
}

impl<T: Entity> FetchRequest<T> {
    /// Unfiltered request over `T`'s entity. Faulting starts enabled.
    pub fn new() -> Self {
        Self::from_criteria(FetchCriteria::new(T::entity_name()))
    }
}

impl<T: Entity> Default for FetchRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FetchRequest<T> {
    pub fn from_criteria(criteria: FetchCriteria) -> Self {
        Self {
            criteria,
            returns_objects_as_faults: true,
            _marker: PhantomData,
        }
    }

    pub fn criteria(&self) -> &FetchCriteria {
        &self.criteria
    }

    pub fn into_criteria(self) -> FetchCriteria {
        self.criteria
    }

    pub fn entity_name(&self) -> &str {
        self.criteria.entity()
    }

    pub fn limit(&self) -> Option<usize> {
        self.criteria.limit
    }

    pub fn set_predicate(&mut self, predicate: Option<NativePredicate>) {
        self.criteria.predicate = predicate;
    }

    pub fn set_sort(&mut self, sort: Vec<NativeSort>) {
        self.criteria.sort = sort;
    }

    /// `Some(0)` is stored as no limit.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.criteria.limit = effective_limit(limit);
    }

    /// When `true`, objects already registered in the fetching context keep
    /// their cached snapshot instead of being re-materialized from the store.
    pub fn returns_objects_as_faults(&self) -> bool {
        self.returns_objects_as_faults
    }

    pub fn set_returns_objects_as_faults(&mut self, faults: bool) {
        self.returns_objects_as_faults = faults;
    }
}

/// What a batch delete reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchDeleteResultType {
    #[default]
    StatusOnly,
    Count,
    ObjectIds,
}

/// Identifier-only delete executed directly by the store.
///
/// The criteria's limit is carried but not applied: the store deletes every
/// match.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDeleteRequest {
    criteria: FetchCriteria,
    result_type: BatchDeleteResultType,
}

impl BatchDeleteRequest {
    pub fn new(criteria: FetchCriteria) -> Self {
        Self {
            criteria,
            result_type: BatchDeleteResultType::default(),
        }
    }

    /// Deletes every object of `entity`.
    pub fn for_entity(entity: impl Into<String>) -> Self {
        Self::new(FetchCriteria::new(entity))
    }

    pub fn with_result_type(mut self, result_type: BatchDeleteResultType) -> Self {
        self.result_type = result_type;
        self
    }

    pub fn criteria(&self) -> &FetchCriteria {
        &self.criteria
    }

    pub fn result_type(&self) -> BatchDeleteResultType {
        self.result_type
    }
}

impl<T> From<FetchRequest<T>> for BatchDeleteRequest {
    fn from(request: FetchRequest<T>) -> Self {
        Self::new(request.into_criteria())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchDeleteResult {
    /// Whether any row was deleted.
    Status(bool),
    Count(usize),
    ObjectIds(Vec<ObjectId>),
}

impl BatchDeleteResult {
    /// Deleted identities, when the result form reports them.
    pub fn deleted_ids(&self) -> Option<&[ObjectId]> {
        match self {
            Self::ObjectIds(ids) => Some(ids),
            Self::Status(_) | Self::Count(_) => None,
        }
    }
}
