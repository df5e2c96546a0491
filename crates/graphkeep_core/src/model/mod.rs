//! Persisted record contracts.
//!
//! # Responsibility
//! - Define the capability set every persisted record type must satisfy.
//! - Define store-assigned identity and the context-bound record handle.
//! - Hold the managed-object model (the set of known entity names).
//!
//! # Invariants
//! - Every registered object is identified by a stable `ObjectId`.
//! - A `Record` belongs to exactly one unit-of-work context.

pub mod entity;
pub mod registry;
