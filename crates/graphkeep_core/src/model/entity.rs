//! Entity capability contract and record handles.
//!
//! # Invariants
//! - `ObjectId` is assigned once, when an object is first registered, and is
//!   never reused for another object.
//! - `Entity::unique_id` is application identity and is independent of
//!   `ObjectId`.
//! - A `Record` is a materialized snapshot; cross-context visibility requires
//!   re-resolving it by `ObjectId` inside the target context.

use crate::context::{Context, ContextId};
use crate::query::{FetchRequest, QuerySpec};
use crate::repo::object_repo::StoreResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

/// Store-assigned opaque identity of a persisted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses the textual form stored in the `objects.object_id` column.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability set a record type must satisfy to be persisted.
///
/// Implementors supply the application identity accessor; everything else has
/// a default. Records are encoded through `serde` and must serialize to a map
/// (a struct with named fields).
pub trait Entity: Serialize + DeserializeOwned + Send + 'static {
    /// Stable name addressing the store's logical table.
    ///
    /// Defaults to the type's own name without its module path.
    fn entity_name() -> String {
        default_entity_name::<Self>()
    }

    /// Application-level identity, independent of `ObjectId`.
    fn unique_id(&self) -> Option<&str>;

    /// Creates a default-valued record registered in `context`.
    fn init(context: &mut Context) -> StoreResult<Record<Self>>
    where
        Self: Default,
    {
        context.insert(Self::default())
    }

    /// Builds the native fetch request for `spec`.
    ///
    /// The default disables faulting so callers always see fully
    /// materialized values.
    fn fetch_request(spec: &QuerySpec<Self>) -> FetchRequest<Self> {
        let mut request = spec.compile();
        request.set_returns_objects_as_faults(false);
        request
    }

    /// Runs before an object-level delete is staged in `context`.
    ///
    /// Batch deletes bypass materialization and never call this hook.
    fn prepare_for_deletion(&self, _context: &mut Context) -> StoreResult<()> {
        Ok(())
    }
}

/// Returns the unqualified type name of `T`, generics stripped.
pub fn default_entity_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_string()
}

/// Materialized record bound to the context it was registered in.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    object_id: ObjectId,
    context: ContextId,
    value: T,
}

impl<T> Record<T> {
    pub(crate) fn new(object_id: ObjectId, context: ContextId, value: T) -> Self {
        Self {
            object_id,
            context,
            value,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Identity of the context owning this record.
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Record<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for Record<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}
