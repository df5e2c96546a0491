//! On-disk store location resolution.
//!
//! # Invariants
//! - Resolution is deterministic given the locator roots, the location
//!   descriptor, the container name, and the filesystem state.
//! - Intermediate directories are created on demand.

use directories::BaseDirs;
use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};

pub const STORE_FILE_EXTENSION: &str = "sqlite";
const GROUP_CONTAINERS_DIR: &str = "group-containers";
const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm"];

/// Where a store file lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageLocation {
    /// Container directory shared by every app in the group `identifier`.
    SharedGroup(String),
    /// Application-support directory of the current app.
    #[default]
    LocalApp,
}

/// Root directories used to resolve store paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocator {
    app_support_dir: PathBuf,
    group_containers_dir: PathBuf,
}

impl StoreLocator {
    pub fn new(app_support_dir: impl Into<PathBuf>, group_containers_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_support_dir: app_support_dir.into(),
            group_containers_dir: group_containers_dir.into(),
        }
    }

    /// Platform data directory, or the temp directory when no home exists.
    pub fn from_platform() -> Self {
        let data_dir = BaseDirs::new()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(std::env::temp_dir);
        Self::new(data_dir.clone(), data_dir.join(GROUP_CONTAINERS_DIR))
    }

    pub fn app_support_dir(&self) -> &Path {
        &self.app_support_dir
    }

    pub fn group_containers_dir(&self) -> &Path {
        &self.group_containers_dir
    }

    /// Resolves `<dir>/<container_name>.sqlite` and creates `<dir>`.
    ///
    /// A shared-group identifier that cannot name a directory falls back to
    /// the local application-support directory. A container name that is not
    /// a single path segment is rejected with `InvalidInput`.
    pub fn store_path(&self, location: &StorageLocation, container_name: &str) -> io::Result<PathBuf> {
        let file_name = store_file_name(container_name)?;
        let directory = self.store_directory(location);
        std::fs::create_dir_all(&directory)?;
        Ok(directory.join(file_name))
    }

    /// Removes the store file and its sidecars; returns whether the store existed.
    pub fn remove_store_if_exists(
        &self,
        location: &StorageLocation,
        container_name: &str,
    ) -> io::Result<bool> {
        let path = self
            .store_directory(location)
            .join(store_file_name(container_name)?);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            match std::fs::remove_file(&sidecar) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        debug!(
            "event=store_remove module=store status=ok path={}",
            path.display()
        );
        Ok(true)
    }

    fn store_directory(&self, location: &StorageLocation) -> PathBuf {
        match location {
            StorageLocation::SharedGroup(identifier) if is_single_path_segment(identifier) => {
                self.group_containers_dir.join(identifier)
            }
            StorageLocation::SharedGroup(identifier) => {
                warn!(
                    "event=store_locate module=store status=fallback reason=invalid_group_identifier identifier={identifier}"
                );
                self.app_support_dir.clone()
            }
            StorageLocation::LocalApp => self.app_support_dir.clone(),
        }
    }
}

impl Default for StoreLocator {
    fn default() -> Self {
        Self::from_platform()
    }
}

fn store_file_name(container_name: &str) -> io::Result<String> {
    if !is_single_path_segment(container_name) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("container name `{container_name}` must be a single path segment"),
        ));
    }
    Ok(format!("{container_name}.{STORE_FILE_EXTENSION}"))
}

fn is_single_path_segment(value: &str) -> bool {
    !value.trim().is_empty() && value != "." && value != ".." && !value.contains(['/', '\\'])
}
