//! Lazily opened process-wide coordinator.

use super::config::StoreConfig;
use super::Coordinator;
use crate::store::lock_ignoring_poison;
use once_cell::sync::OnceCell;
use std::sync::Mutex;

/// Holds one coordinator per storage location, opened on first access.
///
/// Declare one `static` cell per store; tests should construct isolated
/// coordinators directly instead.
pub struct CoordinatorCell {
    config: Mutex<Option<StoreConfig>>,
    coordinator: OnceCell<Coordinator>,
}

impl CoordinatorCell {
    pub const fn new() -> Self {
        Self {
            config: Mutex::new(None),
            coordinator: OnceCell::new(),
        }
    }

    /// Sets the configuration used by the first `get`.
    ///
    /// Returns `false` once the coordinator has been opened.
    pub fn configure(&self, config: StoreConfig) -> bool {
        if self.coordinator.get().is_some() {
            return false;
        }
        *lock_ignoring_poison(&self.config) = Some(config);
        true
    }

    /// The shared coordinator, opening it with the configured (or default)
    /// settings on first access.
    pub fn get(&self) -> &Coordinator {
        self.coordinator.get_or_init(|| {
            let config = lock_ignoring_poison(&self.config).take().unwrap_or_default();
            Coordinator::open(config)
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.coordinator.get().is_some()
    }
}

impl Default for CoordinatorCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::CoordinatorCell;
    use crate::coordinator::config::StoreConfig;

    #[test]
    fn opens_once_with_configured_settings() {
        let cell = CoordinatorCell::new();
        assert!(!cell.is_initialized());
        assert!(cell.configure(StoreConfig::in_memory()));

        let first = cell.get() as *const _;
        let second = cell.get() as *const _;
        assert_eq!(first, second);
        assert!(cell.is_initialized());
        assert!(cell.get().store().is_in_memory());
        assert!(!cell.configure(StoreConfig::in_memory()));
    }
}
