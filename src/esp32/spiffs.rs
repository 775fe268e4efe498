//! SPIFFS mount control.
//!
//! The update window requires the filesystem to be fully offline, so mount
//! and unmount map to registering and unregistering the SPIFFS VFS.

use std::ffi::CString;
use std::ptr;

use crate::platform::{Filesystem, PlatformError};

/// SPIFFS filesystem registered at a VFS base path.
pub struct EspSpiffs {
    base_path: CString,
    partition_label: Option<CString>,
    mounted: bool,
}

impl EspSpiffs {
    /// Prepare a SPIFFS mount at `base_path` (e.g. `/spiffs`). Pass a
    /// partition label to select a partition other than the first SPIFFS
    /// one. The filesystem is not mounted until [`Filesystem::mount`].
    pub fn new(base_path: &str, partition_label: Option<&str>) -> Result<Self, PlatformError> {
        let base_path = CString::new(base_path)
            .map_err(|_| PlatformError::Driver("base path contains NUL".to_string()))?;
        let partition_label = match partition_label {
            Some(label) => Some(
                CString::new(label)
                    .map_err(|_| PlatformError::Driver("partition label contains NUL".to_string()))?,
            ),
            None => None,
        };
        Ok(Self {
            base_path,
            partition_label,
            mounted: false,
        })
    }

    fn label_ptr(&self) -> *const std::os::raw::c_char {
        self.partition_label
            .as_ref()
            .map_or(ptr::null(), |label| label.as_ptr())
    }
}

impl Filesystem for EspSpiffs {
    fn mount(&mut self) -> Result<(), PlatformError> {
        if self.mounted {
            return Ok(());
        }
        let conf = esp_idf_sys::esp_vfs_spiffs_conf_t {
            base_path: self.base_path.as_ptr(),
            partition_label: self.label_ptr(),
            max_files: 8,
            format_if_mount_failed: false,
        };
        esp_idf_sys::esp!(unsafe { esp_idf_sys::esp_vfs_spiffs_register(&conf) })?;
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), PlatformError> {
        if !self.mounted {
            return Ok(());
        }
        esp_idf_sys::esp!(unsafe { esp_idf_sys::esp_vfs_spiffs_unregister(self.label_ptr()) })?;
        self.mounted = false;
        Ok(())
    }
}
