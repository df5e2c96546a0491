//! Concurrency-safe persistence coordinator over a SQLite object store.
//!
//! Records are persisted through unit-of-work contexts; all mutating work is
//! serialized by one `Coordinator` per store.

pub mod context;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod store;

pub use context::merge::{ChangeSet, ChangedObject, PresentationEvent, ReconcileState};
pub use context::{Context, ContextId, ContextKind};
pub use coordinator::cell::CoordinatorCell;
pub use coordinator::config::StoreConfig;
pub use coordinator::entities::Entities;
pub use coordinator::{Coordinator, MainContext};
pub use error::{BatchDeleteError, DeleteError, FetchError, InsertError, OpenError, SaveError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{Entity, ObjectId, Record};
pub use model::registry::ObjectModel;
pub use query::{
    BatchDeleteRequest, BatchDeleteResult, BatchDeleteResultType, FetchRequest, Field, FilterExpr,
    NativePredicate, NativeSort, QuerySpec, SortKey,
};
pub use repo::object_repo::{StoreError, StoreResult};
pub use store::{StorageLocation, Store, StoreLocator};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
