//! Error types
//!
//! Every failure is an explicit value; nothing unwinds.

use rnode_storage_hal::BackendError;

use crate::config::ConfigError;
use crate::path::PathError;

/// Errors from storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Back end could not be mounted
    Mount(BackendError),
    /// Path failed validation
    InvalidPath(PathError),
    /// File or directory could not be opened
    Open(BackendError),
    /// Fewer bytes transferred than requested
    PartialIo { expected: usize, actual: usize },
    /// Destructive format failed
    Format(BackendError),
    /// Any other back-end failure
    Backend(BackendError),
    /// Storage has not been installed in the handle
    NotMounted,
    /// Storage was already installed
    AlreadyInitialized,
    /// Storage is in use by an enclosing operation
    Busy,
}

impl From<PathError> for StorageError {
    fn from(e: PathError) -> Self {
        StorageError::InvalidPath(e)
    }
}

impl From<BackendError> for StorageError {
    fn from(e: BackendError) -> Self {
        StorageError::Backend(e)
    }
}

/// Errors that abort storage initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    /// Storage configuration is invalid
    Config(ConfigError),
    /// Initialization already ran
    AlreadyInitialized,
    /// Back end failed to mount
    Mount(BackendError),
    /// Writability probe failed and the recovery format failed too
    Format(BackendError),
    /// Storage could not be installed
    Storage(StorageError),
}

impl BootError {
    /// Flash cannot hold working data
    ///
    /// The firmware shows a dedicated fault for this instead of retrying.
    pub fn is_hardware_failure(&self) -> bool {
        matches!(self, BootError::Format(_))
    }
}

impl From<StorageError> for BootError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Mount(e) => BootError::Mount(e),
            StorageError::Format(e) => BootError::Format(e),
            StorageError::AlreadyInitialized => BootError::AlreadyInitialized,
            e => BootError::Storage(e),
        }
    }
}

impl From<ConfigError> for BootError {
    fn from(e: ConfigError) -> Self {
        BootError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_format_failure_is_hardware_failure() {
        assert!(BootError::Format(BackendError::Io).is_hardware_failure());
        assert!(!BootError::Mount(BackendError::Corrupted).is_hardware_failure());
        assert!(!BootError::AlreadyInitialized.is_hardware_failure());
        assert!(!BootError::Config(ConfigError::EmptyCanary).is_hardware_failure());
    }

    #[test]
    fn test_storage_errors_map_to_boot_errors() {
        assert_eq!(
            BootError::from(StorageError::Format(BackendError::Io)),
            BootError::Format(BackendError::Io)
        );
        assert_eq!(
            BootError::from(StorageError::Mount(BackendError::Corrupted)),
            BootError::Mount(BackendError::Corrupted)
        );
        assert_eq!(
            BootError::from(StorageError::Busy),
            BootError::Storage(StorageError::Busy)
        );
    }
}
