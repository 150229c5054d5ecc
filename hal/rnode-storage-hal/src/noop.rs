//! Null back end for boards built without persistent storage
//!
//! Mounts and formats successfully and accepts writes, but never stores
//! anything. Reads and lookups always miss.

use crate::fs::{BackendError, Capacity, EntryKind, FlashFilesystem, OpenMode};

/// Filesystem that discards everything written to it
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFilesystem;

/// Handle returned by [`NoopFilesystem::open`]
#[derive(Debug)]
pub struct NoopFile;

impl NoopFilesystem {
    pub const fn new() -> Self {
        Self
    }
}

impl FlashFilesystem for NoopFilesystem {
    type File = NoopFile;

    fn mount(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn format(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn open(&mut self, _path: &str, mode: OpenMode) -> Result<NoopFile, BackendError> {
        match mode {
            OpenMode::Read => Err(BackendError::NotFound),
            OpenMode::WriteTruncate => Ok(NoopFile),
        }
    }

    fn file_len(&mut self, _file: &NoopFile) -> Result<usize, BackendError> {
        Ok(0)
    }

    fn read(&mut self, _file: &mut NoopFile, _buf: &mut [u8]) -> Result<usize, BackendError> {
        Ok(0)
    }

    fn write(&mut self, _file: &mut NoopFile, data: &[u8]) -> Result<usize, BackendError> {
        Ok(data.len())
    }

    fn close(&mut self, _file: NoopFile) -> Result<(), BackendError> {
        Ok(())
    }

    fn stat(&mut self, _path: &str) -> Result<Option<EntryKind>, BackendError> {
        Ok(None)
    }

    fn remove(&mut self, _path: &str) -> Result<(), BackendError> {
        Err(BackendError::NotFound)
    }

    fn rename(&mut self, _from: &str, _to: &str) -> Result<(), BackendError> {
        Err(BackendError::NotFound)
    }

    fn mkdir(&mut self, _path: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported)
    }

    fn rmdir(&mut self, _path: &str) -> Result<(), BackendError> {
        Err(BackendError::NotFound)
    }

    fn rmdir_is_recursive(&self) -> bool {
        false
    }

    fn list_children(
        &mut self,
        _path: &str,
        _visitor: &mut dyn FnMut(&str, EntryKind),
    ) -> Result<(), BackendError> {
        Err(BackendError::NotFound)
    }

    fn capacity(&mut self) -> Result<Capacity, BackendError> {
        Ok(Capacity::Bytes { total: 0, used: 0 })
    }
}
