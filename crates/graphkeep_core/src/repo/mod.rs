//! Row-level persistence over the `objects` table.
//!
//! # Responsibility
//! - Keep SQL details inside the store boundary.
//! - Translate native fetch criteria into SELECT / COUNT / DELETE statements.
//!
//! # Invariants
//! - Every statement is scoped to exactly one entity.
//! - Read paths reject malformed persisted rows instead of masking them.

pub mod object_repo;
