//! Entity-level helpers bound to the main context.
//!
//! Thin wrappers over the context helpers: failures become `FetchError` or
//! `BatchDeleteError` after being logged.

use super::{Coordinator, MODULE};
use crate::error::{log_failure, BatchDeleteError, FetchError};
use crate::model::entity::{Entity, Record};
use crate::query::{BatchDeleteRequest, BatchDeleteResult, BatchDeleteResultType, QuerySpec};
use std::marker::PhantomData;

pub struct Entities<'c, T> {
    coordinator: &'c Coordinator,
    _marker: PhantomData<fn() -> T>,
}

impl<'c, T: Entity> Entities<'c, T> {
    pub(crate) fn new(coordinator: &'c Coordinator) -> Self {
        Self {
            coordinator,
            _marker: PhantomData,
        }
    }

    /// First match on the main context; `Ok(None)` when nothing matches.
    pub fn get_first(&self, spec: &QuerySpec<T>) -> Result<Option<Record<T>>, FetchError> {
        self.coordinator
            .main_context()
            .get_first(spec)
            .map_err(|err| log_failure("get_first", MODULE, err))
    }

    pub fn get_all(&self, spec: &QuerySpec<T>) -> Result<Vec<Record<T>>, FetchError> {
        self.coordinator
            .main_context()
            .get_all(spec)
            .map_err(|err| log_failure("get_all", MODULE, err))
    }

    pub fn count(&self, spec: &QuerySpec<T>) -> Result<usize, FetchError> {
        self.coordinator
            .main_context()
            .count_matching(spec)
            .map_err(|err| log_failure("count", MODULE, err))
    }

    /// Re-resolves `record` inside the main context.
    ///
    /// `Ok(None)` when the object no longer exists.
    pub fn refresh(&self, record: &Record<T>) -> Result<Option<Record<T>>, FetchError> {
        self.coordinator
            .main_context()
            .object(record.object_id())
            .map_err(|err| log_failure("refresh", MODULE, err))
    }

    /// Identifier-only delete of every match of `spec`.
    ///
    /// Matched records are never loaded. The query limit is not honored.
    pub async fn batch_delete(&self, spec: &QuerySpec<T>) -> Result<BatchDeleteResult, BatchDeleteError> {
        let request = BatchDeleteRequest::from(T::fetch_request(spec))
            .with_result_type(BatchDeleteResultType::ObjectIds);
        self.coordinator.batch_delete(request).await
    }
}
