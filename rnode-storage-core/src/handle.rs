//! Process-wide storage handle
//!
//! The firmware keeps one mounted [`Storage`] for its whole lifetime. It is
//! installed once by the boot sequence and reached afterwards only through
//! [`StorageHandle::with`], which holds a single lock for the duration of
//! one operation.
//!
//! ```ignore
//! static STORAGE: StorageHandle<CriticalSectionRawMutex, Backend> = StorageHandle::new();
//!
//! let identity = STORAGE.with(|fs| fs.read_file("/eeprom"))?;
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use rnode_storage_hal::FlashFilesystem;

use crate::error::StorageError;
use crate::storage::Storage;

/// Init-once owner of the mounted storage
pub struct StorageHandle<M: RawMutex, B: FlashFilesystem> {
    inner: Mutex<M, RefCell<Option<Storage<B>>>>,
}

impl<M: RawMutex, B: FlashFilesystem> StorageHandle<M, B> {
    /// Empty handle, usable in a `static`
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install mounted storage
    ///
    /// Only the first install succeeds; the storage is never torn down.
    pub fn install(&self, storage: Storage<B>) -> Result<(), StorageError> {
        self.inner.lock(|cell| {
            let mut slot = cell.try_borrow_mut().map_err(|_| StorageError::Busy)?;
            if slot.is_some() {
                warn!("storage handle already initialized");
                return Err(StorageError::AlreadyInitialized);
            }
            *slot = Some(storage);
            Ok(())
        })
    }

    pub fn is_installed(&self) -> bool {
        self.inner
            .lock(|cell| cell.try_borrow().map(|slot| slot.is_some()).unwrap_or(true))
    }

    /// Run one storage operation under the lock
    ///
    /// Calling `with` again from inside `f` returns [`StorageError::Busy`].
    pub fn with<R>(&self, f: impl FnOnce(&mut Storage<B>) -> R) -> Result<R, StorageError> {
        self.inner.lock(|cell| {
            let mut slot = cell.try_borrow_mut().map_err(|_| StorageError::Busy)?;
            match slot.as_mut() {
                Some(storage) => Ok(f(storage)),
                None => Err(StorageError::NotMounted),
            }
        })
    }
}

impl<M: RawMutex, B: FlashFilesystem> Default for StorageHandle<M, B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use rnode_storage_hal_ram::{RamConfig, RamFilesystem};

    type Handle = StorageHandle<NoopRawMutex, RamFilesystem>;

    fn storage() -> Storage<RamFilesystem> {
        Storage::mount(RamFilesystem::new(RamConfig::block_fs())).unwrap()
    }

    #[test]
    fn test_use_before_install() {
        let handle = Handle::new();
        assert!(!handle.is_installed());
        assert_eq!(
            handle.with(|fs| fs.file_exists("/eeprom")),
            Err(StorageError::NotMounted)
        );
    }

    #[test]
    fn test_install_once() {
        let handle = Handle::new();
        assert_eq!(handle.install(storage()), Ok(()));
        assert!(handle.is_installed());
        assert_eq!(
            handle.install(storage()),
            Err(StorageError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_operations_through_handle() {
        let handle = Handle::new();
        handle.install(storage()).unwrap();
        assert_eq!(handle.with(|fs| fs.write_file("/a", b"xyz")), Ok(3));
        assert_eq!(handle.with(|fs| fs.read_file("/a")), Ok(b"xyz".to_vec()));
    }

    #[test]
    fn test_reentrant_use_is_busy() {
        let handle = Handle::new();
        handle.install(storage()).unwrap();
        let inner = handle.with(|_| handle.with(|fs| fs.file_exists("/a")));
        assert_eq!(inner, Ok(Err(StorageError::Busy)));
    }
}
