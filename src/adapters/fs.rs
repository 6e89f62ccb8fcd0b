//! Flash filesystem adapter.
//!
//! Implements [`StoragePort`] for the two configuration documents.
//!
//! - **`target_os = "espidf"`**: SPIFFS partition mounted under
//!   [`MOUNT_POINT`] through the ESP-IDF VFS, accessed with `std::fs`.
//! - **all other targets**: in-memory map (dev/test only).
//!
//! # Atomic writes
//!
//! A document is written to `<path>.tmp` and synced.  SPIFFS cannot rename
//! over an existing file, so the original is removed first and the temp
//! file renamed into place.  Power lost between those two steps leaves only
//! the complete `<path>.tmp`; the next read finishes the rename.  A reader
//! therefore sees either the old or the new document, never a truncated one.

use log::{debug, info};
#[cfg(any(target_os = "espidf", test))]
use log::warn;

use crate::app::ports::StoragePort;
use crate::error::StorageError;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

/// VFS prefix of the data partition.
pub const MOUNT_POINT: &str = "/spiffs";

/// Largest document accepted for writing.
const MAX_FILE_SIZE: usize = 16 * 1024;

pub struct FsAdapter {
    #[cfg(not(target_os = "espidf"))]
    files: HashMap<String, Vec<u8>>,
}

impl FsAdapter {
    /// Mount the data partition, formatting it if it has never been
    /// mounted.
    #[cfg(target_os = "espidf")]
    pub fn mount() -> Result<Self, StorageError> {
        use esp_idf_svc::sys::{ESP_OK, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register};

        let conf = esp_vfs_spiffs_conf_t {
            base_path: c"/spiffs".as_ptr(),
            partition_label: core::ptr::null(),
            max_files: 4,
            format_if_mount_failed: true,
        };
        // SAFETY: called once from the main task before any file access;
        // `conf` outlives the call and the strings are 'static.
        let ret = unsafe { esp_vfs_spiffs_register(&conf) };
        if ret != ESP_OK {
            log::error!("FS: SPIFFS mount failed ({})", ret);
            return Err(StorageError::Io);
        }
        info!("FS: SPIFFS mounted at {}", MOUNT_POINT);
        Ok(Self {})
    }

    /// Simulation: start with an empty filesystem.
    #[cfg(not(target_os = "espidf"))]
    pub fn mount() -> Result<Self, StorageError> {
        info!("FS: simulation backend");
        Ok(Self {
            files: HashMap::new(),
        })
    }

    #[cfg(target_os = "espidf")]
    fn full_path(path: &str) -> String {
        format!("{}{}", MOUNT_POINT, path)
    }
}

#[cfg(target_os = "espidf")]
fn map_io(e: &std::io::Error) -> StorageError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::NotFound,
        std::io::ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::Io,
    }
}

#[cfg(any(target_os = "espidf", test))]
fn tmp_path(target: &str) -> String {
    format!("{}.tmp", target)
}

/// Write `data` to `target` through a synced temp file.
#[cfg(any(target_os = "espidf", test))]
fn replace_file(target: &str, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let tmp = tmp_path(target);
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(data)?;
        f.sync_all()?;
    }
    if let Err(e) = std::fs::remove_file(target) {
        if e.kind() != std::io::ErrorKind::NotFound {
            return Err(e);
        }
    }
    std::fs::rename(&tmp, target)
}

/// Complete a replace that lost power after removing the original.
#[cfg(any(target_os = "espidf", test))]
fn recover_interrupted(target: &str) -> std::io::Result<()> {
    let tmp = tmp_path(target);
    if std::fs::metadata(target).is_err() && std::fs::metadata(&tmp).is_ok() {
        warn!("FS: completing interrupted write of {}", target);
        std::fs::rename(&tmp, target)?;
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
impl StoragePort for FsAdapter {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = Self::full_path(path);
        recover_interrupted(&target).map_err(|e| map_io(&e))?;
        std::fs::read(&target).map_err(|e| map_io(&e))
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_FILE_SIZE {
            return Err(StorageError::Full);
        }
        replace_file(&Self::full_path(path), data).map_err(|e| map_io(&e))?;
        debug!("FS: wrote {} bytes to {}", data.len(), path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let target = Self::full_path(path);
        std::fs::metadata(&target).is_ok() || std::fs::metadata(tmp_path(&target)).is_ok()
    }
}
#[cfg(not(target_os = "espidf"))]
impl StoragePort for FsAdapter {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.files.get(path).cloned().ok_or(StorageError::NotFound)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_FILE_SIZE {
            return Err(StorageError::Full);
        }
        self.files.insert(path.to_owned(), data.to_vec());
        debug!("FS(sim): wrote {} bytes to {}", data.len(), path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}
