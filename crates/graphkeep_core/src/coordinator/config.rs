//! Coordinator configuration.

use crate::db::ValueTransformers;
use crate::model::entity::Entity;
use crate::model::registry::ObjectModel;
use crate::store::{StorageLocation, StoreLocator};
use rusqlite::Connection;
use std::fmt::{Debug, Formatter};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONTAINER_NAME: &str = "Model";
pub const DEFAULT_DEBUG_LOCATION_INTERVAL: Duration = Duration::from_secs(5);

/// Everything needed to open one durable store.
#[derive(Clone)]
pub struct StoreConfig {
    location: StorageLocation,
    container_name: String,
    in_memory: bool,
    locator: Option<StoreLocator>,
    debug_location_interval: Duration,
    model: ObjectModel,
    value_transformers: Option<Arc<ValueTransformers>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StorageLocation::default(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            in_memory: false,
            locator: None,
            debug_location_interval: DEFAULT_DEBUG_LOCATION_INTERVAL,
            model: ObjectModel::new(),
            value_transformers: None,
        }
    }
}

impl Debug for StoreConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("location", &self.location)
            .field("container_name", &self.container_name)
            .field("in_memory", &self.in_memory)
            .field("locator", &self.locator)
            .field("debug_location_interval", &self.debug_location_interval)
            .field("model", &self.model)
            .field("value_transformers", &self.value_transformers.is_some())
            .finish()
    }
}

impl StoreConfig {
    /// File-backed store in the local application-support directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ephemeral store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: StorageLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_container_name(mut self, container_name: impl Into<String>) -> Self {
        self.container_name = container_name.into();
        self
    }

    pub fn with_locator(mut self, locator: StoreLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Interval of the debug-build store location log line.
    pub fn with_debug_location_interval(mut self, interval: Duration) -> Self {
        self.debug_location_interval = interval;
        self
    }

    /// Adds `T` to the managed-object model.
    pub fn register<T: Entity>(mut self) -> Self {
        self.model.register::<T>();
        self
    }

    /// Registers custom SQL functions before the store opens.
    pub fn with_value_transformers<F>(mut self, register: F) -> Self
    where
        F: Fn(&Connection) -> rusqlite::Result<()> + Send + Sync + 'static,
    {
        self.value_transformers = Some(Arc::new(register));
        self
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    pub fn debug_location_interval(&self) -> Duration {
        self.debug_location_interval
    }

    pub fn model(&self) -> &ObjectModel {
        &self.model
    }

    pub(crate) fn value_transformers(&self) -> Option<&ValueTransformers> {
        self.value_transformers.as_deref()
    }

    /// On-disk store path, creating its directory; `None` in memory mode.
    pub fn resolve_store_path(&self) -> io::Result<Option<PathBuf>> {
        if self.in_memory {
            return Ok(None);
        }
        let locator = self.locator.clone().unwrap_or_else(StoreLocator::from_platform);
        locator
            .store_path(&self.location, &self.container_name)
            .map(Some)
    }
}
