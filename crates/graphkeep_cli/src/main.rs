//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `graphkeep_core` linkage and store bootstrap without an app.
//! - Print where a named container would live on this machine.

use graphkeep_core::{Coordinator, StoreConfig, StoreLocator, StorageLocation};

fn main() {
    println!("graphkeep_core version={}", graphkeep_core::core_version());

    let coordinator = Coordinator::open(StoreConfig::in_memory());
    println!(
        "graphkeep_core in_memory={} writes={}",
        coordinator.store().is_in_memory(),
        coordinator.store().write_count()
    );

    let container_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| graphkeep_core::coordinator::config::DEFAULT_CONTAINER_NAME.to_string());
    match StoreLocator::from_platform().store_path(&StorageLocation::LocalApp, &container_name) {
        Ok(path) => println!("graphkeep_core store_path={}", path.display()),
        Err(err) => {
            eprintln!("graphkeep_core store_path error={err}");
            std::process::exit(1);
        }
    }
}
