//! Store-agnostic query specification and its native (SQL) compilation.
//!
//! # Responsibility
//! - Describe filter + ordering + limit as a typed value over a record type.
//! - Accept pre-built native predicates and sort terms as an escape hatch.
//! - Compile to the native fetch request only at the access boundary.
//!
//! # Invariants
//! - Compilation is pure: it never touches a store.
//! - A native predicate replaces the typed filter; a non-empty native sort
//!   list replaces the typed order.
//! - Sort terms compile in declaration order with no implicit secondary key.

pub mod filter;
pub mod native;
pub mod request;
pub mod spec;

pub use filter::{Field, FieldValue, FilterExpr, SortKey};
pub use native::{NativePredicate, NativeSort};
pub use request::{
    BatchDeleteRequest, BatchDeleteResult, BatchDeleteResultType, FetchCriteria, FetchRequest,
};
pub use spec::{NativeSpec, QuerySpec};
