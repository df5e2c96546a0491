//! Managed-object model: the entity names a store knows about.

use crate::model::entity::Entity;
use std::collections::BTreeSet;

/// Set of entity names registered for one store.
///
/// Saving or fetching an entity outside this set fails with
/// `StoreError::UnknownEntity`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectModel {
    entities: BTreeSet<String>,
}

impl ObjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under its entity name. Re-registration is a no-op.
    pub fn register<T: Entity>(&mut self) -> &mut Self {
        self.entities.insert(T::entity_name());
        self
    }

    pub fn register_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.entities.insert(name.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains(name)
    }

    /// Registered entity names in sorted order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
