//! Storage abstraction
//!
//! [`Storage`] wraps exactly one compiled-in [`FlashFilesystem`] and
//! normalizes its results: reads return the exact on-flash content or
//! nothing, writes return a byte count, namespace operations return a
//! boolean. Every failure is logged here so callers only branch on the
//! result.
//!
//! The `try_*` variants return the tagged [`StorageError`] for callers that
//! need to tell failures apart.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use rnode_storage_hal::{BackendError, EntryKind, FlashFilesystem, OpenMode};

use crate::error::StorageError;
use crate::path::FilePath;
use crate::ByteBuffer;

/// Open file guard
///
/// Closes the handle when dropped so early returns never leak it.
struct OpenFile<'a, B: FlashFilesystem> {
    backend: &'a mut B,
    file: Option<B::File>,
}

impl<'a, B: FlashFilesystem> OpenFile<'a, B> {
    fn len(&mut self) -> Result<usize, BackendError> {
        match self.file.as_ref() {
            Some(file) => self.backend.file_len(file),
            None => Err(BackendError::NotFound),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BackendError> {
        match self.file.as_mut() {
            Some(file) => self.backend.read(file, buf),
            None => Err(BackendError::NotFound),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, BackendError> {
        match self.file.as_mut() {
            Some(file) => self.backend.write(file, data),
            None => Err(BackendError::NotFound),
        }
    }

    /// Close explicitly, surfacing a failed flush
    fn close(mut self) -> Result<(), BackendError> {
        match self.file.take() {
            Some(file) => self.backend.close(file),
            None => Ok(()),
        }
    }
}

impl<B: FlashFilesystem> Drop for OpenFile<'_, B> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = self.backend.close(file) {
                warn!("closing file handle failed: {:?}", e);
            }
        }
    }
}

/// Mounted storage over one back end
pub struct Storage<B: FlashFilesystem> {
    backend: B,
}

impl<B: FlashFilesystem> Storage<B> {
    /// Mount the back end
    ///
    /// The outcome is always reported; a failed mount gives the caller
    /// nothing to operate on.
    pub fn mount(mut backend: B) -> Result<Self, StorageError> {
        match backend.mount() {
            Ok(()) => {
                debug!("filesystem mounted");
                Ok(Self { backend })
            }
            Err(e) => {
                error!("filesystem mount failed: {:?}", e);
                Err(StorageError::Mount(e))
            }
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Keep room in the back end's entry table for `path`
    pub fn reserve_path(&mut self, path: &str) -> bool {
        let Ok(path) = FilePath::new(path) else {
            return false;
        };
        match self.backend.reserve(path.as_str()) {
            Ok(()) => true,
            Err(e) => {
                warn!("could not reserve an entry for {}: {:?}", path, e);
                false
            }
        }
    }

    fn open(&mut self, path: &FilePath, mode: OpenMode) -> Result<OpenFile<'_, B>, StorageError> {
        let file = self
            .backend
            .open(path.as_str(), mode)
            .map_err(StorageError::Open)?;
        Ok(OpenFile {
            backend: &mut self.backend,
            file: Some(file),
        })
    }

    /// True iff `path` is an existing file
    pub fn file_exists(&mut self, path: &str) -> bool {
        let Ok(path) = FilePath::new(path) else {
            return false;
        };
        matches!(self.backend.stat(path.as_str()), Ok(Some(EntryKind::File)))
    }

    /// Size of a file in bytes
    pub fn file_size(&mut self, path: &str) -> Result<usize, StorageError> {
        let path = FilePath::new(path)?;
        let mut file = self.open(&path, OpenMode::Read)?;
        let len = file.len()?;
        file.close()?;
        Ok(len)
    }

    /// Read a whole file into `buf`
    ///
    /// `buf` is cleared first. On a short read it is truncated to the bytes
    /// actually transferred and [`StorageError::PartialIo`] is returned.
    pub fn try_read_into(
        &mut self,
        path: &str,
        buf: &mut ByteBuffer,
    ) -> Result<usize, StorageError> {
        buf.clear();
        let path = FilePath::new(path)?;
        let mut file = self.open(&path, OpenMode::Read)?;
        let expected = file.len()?;

        buf.resize(expected, 0);
        let mut filled = 0;
        let result = loop {
            if filled == expected {
                break Ok(());
            }
            match file.read(&mut buf[filled..]) {
                Ok(0) => break Ok(()),
                Ok(n) => filled += n,
                Err(e) => break Err(e),
            }
        };
        buf.truncate(filled);
        result?;
        file.close()?;

        if filled != expected {
            return Err(StorageError::PartialIo {
                expected,
                actual: filled,
            });
        }
        Ok(filled)
    }

    /// Read a whole file
    pub fn try_read_file(&mut self, path: &str) -> Result<ByteBuffer, StorageError> {
        let mut buf = Vec::new();
        self.try_read_into(path, &mut buf)?;
        Ok(buf)
    }

    /// Read a whole file, empty on any failure
    pub fn read_file(&mut self, path: &str) -> ByteBuffer {
        match self.try_read_file(path) {
            Ok(data) => data,
            Err(e) => {
                log_read_failure(path, &e);
                Vec::new()
            }
        }
    }

    /// Read a whole file into `buf`, returning the bytes transferred
    ///
    /// `buf.len()` always equals the returned count.
    pub fn read_file_into(&mut self, path: &str, buf: &mut ByteBuffer) -> usize {
        if let Err(e) = self.try_read_into(path, buf) {
            log_read_failure(path, &e);
        }
        buf.len()
    }

    /// Replace a file with `data`
    ///
    /// Any existing file at `path` is removed first; the back ends cannot
    /// truncate in place. Returns [`StorageError::PartialIo`] when fewer
    /// bytes than requested were persisted.
    pub fn try_write_file(&mut self, path: &str, data: &[u8]) -> Result<usize, StorageError> {
        let path = FilePath::new(path)?;
        match self.backend.stat(path.as_str())? {
            Some(EntryKind::File) => self.backend.remove(path.as_str())?,
            Some(EntryKind::Directory) => {
                return Err(StorageError::Open(BackendError::IsADirectory))
            }
            None => {}
        }

        let mut file = self.open(&path, OpenMode::WriteTruncate)?;
        let mut written = 0;
        while written < data.len() {
            match file.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) => {
                    warn!("write to {} stopped after {} bytes: {:?}", path, written, e);
                    break;
                }
            }
        }

        // Data is only persisted once the handle is flushed
        if let Err(e) = file.close() {
            warn!("flush of {} failed: {:?}", path, e);
            if data.is_empty() {
                return Err(StorageError::Backend(e));
            }
            written = 0;
        }

        if written < data.len() {
            return Err(StorageError::PartialIo {
                expected: data.len(),
                actual: written,
            });
        }
        Ok(written)
    }

    /// Replace a file with `data`, returning the bytes persisted
    ///
    /// A count below `data.len()` is a failure.
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> usize {
        match self.try_write_file(path, data) {
            Ok(written) => written,
            Err(StorageError::PartialIo { expected, actual }) => {
                error!(
                    "write_file: partial write to {}, {} of {} bytes",
                    path, actual, expected
                );
                actual
            }
            Err(StorageError::Open(e)) => {
                error!("write_file: failed to open output file {}: {:?}", path, e);
                0
            }
            Err(e) => {
                error!("write_file: failed to write {}: {:?}", path, e);
                0
            }
        }
    }

    /// Remove a file, true iff it was removed
    pub fn remove_file(&mut self, path: &str) -> bool {
        let result = FilePath::new(path)
            .map_err(StorageError::from)
            .and_then(|p| Ok(self.backend.remove(p.as_str())?));
        match result {
            Ok(()) => true,
            Err(StorageError::Backend(BackendError::NotFound)) => {
                debug!("remove_file: {} does not exist", path);
                false
            }
            Err(e) => {
                error!("remove_file: could not remove {}: {:?}", path, e);
                false
            }
        }
    }

    /// Rename a file or directory, true iff renamed
    ///
    /// A missing source is a failure on every back end.
    pub fn rename_file(&mut self, from: &str, to: &str) -> bool {
        let result = (|| -> Result<(), StorageError> {
            let from = FilePath::new(from)?;
            let to = FilePath::new(to)?;
            if self.backend.stat(from.as_str())?.is_none() {
                return Err(StorageError::Backend(BackendError::NotFound));
            }
            self.backend.rename(from.as_str(), to.as_str())?;
            Ok(())
        })();
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("rename_file: could not rename {} to {}: {:?}", from, to, e);
                false
            }
        }
    }

    /// True iff `path` is an existing directory
    pub fn directory_exists(&mut self, path: &str) -> bool {
        let Ok(path) = FilePath::new(path) else {
            return false;
        };
        matches!(
            self.backend.stat(path.as_str()),
            Ok(Some(EntryKind::Directory))
        )
    }

    /// Create a directory, true iff created
    pub fn create_directory(&mut self, path: &str) -> bool {
        let result = FilePath::new(path)
            .map_err(StorageError::from)
            .and_then(|p| Ok(self.backend.mkdir(p.as_str())?));
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("create_directory: could not create {}: {:?}", path, e);
                false
            }
        }
    }

    /// Remove a directory and everything below it
    pub fn remove_directory(&mut self, path: &str) -> bool {
        let result = FilePath::new(path)
            .map_err(StorageError::from)
            .and_then(|p| {
                if self.backend.rmdir_is_recursive() {
                    self.backend.rmdir(p.as_str())?;
                } else {
                    self.remove_tree(&p)?;
                }
                Ok(())
            });
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("remove_directory: could not remove {}: {:?}", path, e);
                false
            }
        }
    }

    /// Depth-first removal for back ends whose rmdir needs an empty directory
    fn remove_tree(&mut self, dir: &FilePath) -> Result<(), StorageError> {
        for (name, kind) in self.children(dir)? {
            let child = dir.join(&name)?;
            match kind {
                EntryKind::File => self.backend.remove(child.as_str())?,
                EntryKind::Directory => self.remove_tree(&child)?,
            }
        }
        self.backend.rmdir(dir.as_str())?;
        Ok(())
    }

    /// Immediate children of a directory, names only
    pub(crate) fn children(
        &mut self,
        dir: &FilePath,
    ) -> Result<Vec<(String, EntryKind)>, StorageError> {
        match self.backend.stat(dir.as_str())? {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(StorageError::Open(BackendError::NotADirectory)),
            None => return Err(StorageError::Open(BackendError::NotFound)),
        }
        let mut entries = Vec::new();
        self.backend
            .list_children(dir.as_str(), &mut |name, kind| {
                entries.push((name.to_string(), kind));
            })
            .map_err(StorageError::Open)?;
        Ok(entries)
    }

    /// Names of the files directly inside `path`
    ///
    /// Subdirectories are left out. Empty when the directory cannot be
    /// opened.
    pub fn list_directory(&mut self, path: &str) -> Vec<String> {
        let result = FilePath::new(path)
            .map_err(StorageError::from)
            .and_then(|p| self.children(&p));
        match result {
            Ok(entries) => entries
                .into_iter()
                .filter(|(_, kind)| kind.is_file())
                .map(|(name, _)| name)
                .collect(),
            Err(e) => {
                error!("list_directory: failed to open directory {}: {:?}", path, e);
                Vec::new()
            }
        }
    }

    /// Total capacity in bytes, 0 when it cannot be determined
    pub fn storage_size(&mut self) -> usize {
        match self.backend.capacity() {
            Ok(cap) => cap.total_bytes(),
            Err(e) => {
                error!("storage_size: capacity query failed: {:?}", e);
                0
            }
        }
    }

    /// Free capacity in bytes, 0 when it cannot be determined
    pub fn storage_available(&mut self) -> usize {
        match self.backend.capacity() {
            Ok(cap) => cap.available_bytes(),
            Err(e) => {
                error!("storage_available: capacity query failed: {:?}", e);
                0
            }
        }
    }

    /// Used capacity in bytes, 0 when it cannot be determined
    pub fn storage_used(&mut self) -> usize {
        match self.backend.capacity() {
            Ok(cap) => cap.used_bytes(),
            Err(e) => {
                error!("storage_used: capacity query failed: {:?}", e);
                0
            }
        }
    }

    /// Destructive low-level format, erases everything
    ///
    /// Callers that need data to survive use
    /// [`SafeReformat`](crate::reformat::SafeReformat).
    pub fn format(&mut self) -> Result<(), StorageError> {
        warn!("formatting filesystem");
        self.backend.format().map_err(|e| {
            critical!("filesystem format failed: {:?}", e);
            StorageError::Format(e)
        })
    }

    /// First `limit` bytes of a file
    pub(crate) fn preview(
        &mut self,
        path: &FilePath,
        limit: usize,
    ) -> Result<ByteBuffer, StorageError> {
        let mut file = self.open(path, OpenMode::Read)?;
        let len = file.len()?.min(limit);
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        buf.truncate(filled);
        file.close()?;
        Ok(buf)
    }
}

fn log_read_failure(path: &str, e: &StorageError) {
    match e {
        StorageError::Open(e) => error!("read_file: failed to open input file {}: {:?}", path, e),
        StorageError::PartialIo { expected, actual } => error!(
            "read_file: expected {} bytes from {}, read {}",
            expected, path, actual
        ),
        e => error!("read_file: could not read {}: {:?}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rnode_storage_hal::NoopFilesystem;
    use rnode_storage_hal_flash::{MemFlash, SequentialFilesystem, MAX_FILE_SIZE};
    use rnode_storage_hal_ram::{Faults, RamConfig, RamFilesystem};

    fn mounted(config: RamConfig) -> Storage<RamFilesystem> {
        Storage::mount(RamFilesystem::new(config)).unwrap()
    }

    fn flash_mounted() -> Storage<SequentialFilesystem<MemFlash>> {
        let flash = MemFlash::new(8);
        let range = flash.range();
        Storage::mount(SequentialFilesystem::new(flash, range)).unwrap()
    }

    #[test]
    fn test_mount_failure_is_reported() {
        let backend = RamFilesystem::new(RamConfig::block_fs()).with_faults(Faults {
            fail_mount: true,
            ..Faults::none()
        });
        assert!(matches!(
            Storage::mount(backend),
            Err(StorageError::Mount(BackendError::Corrupted))
        ));
    }

    #[test]
    fn test_write_then_read() {
        let mut storage = mounted(RamConfig::block_fs());
        assert_eq!(storage.write_file("/eeprom", &[0xAB, 0xCD]), 2);
        assert!(storage.file_exists("/eeprom"));
        assert_eq!(storage.read_file("/eeprom"), vec![0xAB, 0xCD]);
        assert_eq!(storage.file_size("/eeprom"), Ok(2));
        assert_eq!(storage.backend().open_handles(), 0);
    }

    #[test]
    fn test_write_replaces_longer_content() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.write_file("/cfg", b"a much longer payload");
        assert_eq!(storage.write_file("/cfg", b"short"), 5);
        assert_eq!(storage.read_file("/cfg"), b"short".to_vec());
    }

    #[test]
    fn test_write_empty_file() {
        let mut storage = mounted(RamConfig::block_fs());
        assert_eq!(storage.try_write_file("/empty", &[]), Ok(0));
        assert!(storage.file_exists("/empty"));
        assert!(storage.read_file("/empty").is_empty());
    }

    #[test]
    fn test_partial_write_reports_short_count() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.backend_mut().faults_mut().write_limit = Some(2);
        assert_eq!(storage.write_file("/test", b"test"), 2);
        assert_eq!(
            storage.try_write_file("/test", b"test"),
            Err(StorageError::PartialIo {
                expected: 4,
                actual: 2
            })
        );
        assert_eq!(storage.backend().open_handles(), 0);
    }

    #[test]
    fn test_out_of_space_is_partial_write() {
        let mut storage = mounted(RamConfig::block_fs().with_block_count(2));
        let data = vec![0x5A; 3 * 4096];
        let written = storage.write_file("/big", &data);
        assert!(written < data.len());
        assert_eq!(written, 2 * 4096);
    }

    #[test]
    fn test_short_read_truncates_buffer() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.write_file("/blob", &[1, 2, 3, 4, 5, 6]);
        storage.backend_mut().faults_mut().read_limit = Some(3);

        let mut buf = vec![0xFF; 32];
        assert_eq!(storage.read_file_into("/blob", &mut buf), 3);
        assert_eq!(buf, vec![1, 2, 3]);
        assert!(storage.read_file("/blob").is_empty());
        assert_eq!(
            storage.try_read_file("/blob"),
            Err(StorageError::PartialIo {
                expected: 6,
                actual: 3
            })
        );
        assert_eq!(storage.backend().open_handles(), 0);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let mut storage = mounted(RamConfig::block_fs());
        let mut buf = vec![9, 9];
        assert!(storage.read_file("/missing").is_empty());
        assert_eq!(storage.read_file_into("/missing", &mut buf), 0);
        assert!(buf.is_empty());
        assert_eq!(
            storage.try_read_file("/missing"),
            Err(StorageError::Open(BackendError::NotFound))
        );
    }

    #[test]
    fn test_invalid_paths_fail_cleanly() {
        let mut storage = mounted(RamConfig::block_fs());
        assert!(!storage.file_exists(""));
        assert!(!storage.file_exists("relative"));
        assert_eq!(storage.write_file("relative", b"x"), 0);
        assert!(!storage.remove_file(""));
        assert!(storage.list_directory("").is_empty());
    }

    #[test]
    fn test_file_exists_is_false_for_directories() {
        let mut storage = mounted(RamConfig::block_fs());
        assert!(storage.create_directory("/logs"));
        assert!(!storage.file_exists("/logs"));
        assert!(storage.directory_exists("/logs"));
        assert!(!storage.directory_exists("/missing"));
    }

    #[test]
    fn test_remove_file() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.write_file("/a", b"1");
        assert!(storage.remove_file("/a"));
        assert!(!storage.file_exists("/a"));
        assert!(!storage.remove_file("/a"));
    }

    #[test]
    fn test_rename_file() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.write_file("/old", b"data");
        assert!(storage.rename_file("/old", "/new"));
        assert!(!storage.file_exists("/old"));
        assert_eq!(storage.read_file("/new"), b"data".to_vec());
        assert!(!storage.rename_file("/old", "/other"));
    }

    #[test]
    fn test_list_directory_excludes_subdirectories() {
        let mut storage = mounted(RamConfig::block_fs());
        assert!(storage.create_directory("/d"));
        assert!(storage.create_directory("/d/sub"));
        assert_eq!(storage.write_file("/d/file", b"x"), 1);
        assert_eq!(storage.list_directory("/d"), vec![String::from("file")]);
    }

    #[test]
    fn test_list_directory_failures_are_empty() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.write_file("/plain", b"x");
        assert!(storage.list_directory("/missing").is_empty());
        assert!(storage.list_directory("/plain").is_empty());
    }

    #[test]
    fn test_remove_directory_non_recursive_backend() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.create_directory("/d");
        storage.create_directory("/d/sub");
        storage.write_file("/d/sub/deep", b"1");
        storage.write_file("/d/top", b"2");
        storage.write_file("/keep", b"3");

        assert!(storage.remove_directory("/d"));
        assert!(!storage.directory_exists("/d"));
        assert!(!storage.file_exists("/d/sub/deep"));
        assert!(storage.file_exists("/keep"));
    }

    #[test]
    fn test_remove_directory_recursive_backend() {
        let mut storage = mounted(RamConfig::internal_fs());
        storage.create_directory("/d");
        storage.write_file("/d/f", b"1");
        assert!(storage.remove_directory("/d"));
        assert!(!storage.directory_exists("/d"));
        assert!(!storage.remove_directory("/d"));
    }

    #[test]
    fn test_flat_backend_rejects_directories() {
        let mut storage = mounted(RamConfig::alt_fs());
        assert!(!storage.create_directory("/d"));
        assert_eq!(storage.write_file("/f", b"x"), 1);
        assert_eq!(storage.list_directory("/"), vec![String::from("f")]);
    }

    #[test]
    fn test_capacity_from_bytes() {
        let mut storage = mounted(RamConfig::block_fs());
        assert_eq!(storage.storage_size(), 32 * 4096);
        assert_eq!(storage.storage_available(), 32 * 4096);
        storage.write_file("/a", b"x");
        assert_eq!(storage.storage_available(), 31 * 4096);
        assert_eq!(storage.storage_used(), 4096);
    }

    #[test]
    fn test_capacity_from_blocks() {
        let mut storage = mounted(RamConfig::internal_fs());
        assert_eq!(storage.storage_size(), 7 * 4096);
        storage.write_file("/a", &[0u8; 5000]);
        assert_eq!(storage.storage_available(), 5 * 4096);
    }

    #[test]
    fn test_format_erases_everything() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.write_file("/a", b"x");
        assert_eq!(storage.format(), Ok(()));
        assert!(!storage.file_exists("/a"));
        assert_eq!(storage.backend().format_count(), 1);
    }

    #[test]
    fn test_format_failure() {
        let mut storage = mounted(RamConfig::block_fs());
        storage.backend_mut().faults_mut().fail_format = true;
        assert_eq!(storage.format(), Err(StorageError::Format(BackendError::Io)));
    }

    #[test]
    fn test_noop_backend() {
        let mut storage = Storage::mount(NoopFilesystem::new()).unwrap();
        assert_eq!(storage.write_file("/test", b"test"), 4);
        assert!(!storage.file_exists("/test"));
        assert!(storage.read_file("/test").is_empty());
        assert_eq!(storage.storage_size(), 0);
    }

    #[test]
    fn test_flash_namespace_operations() {
        let mut storage = flash_mounted();
        assert!(storage.create_directory("/logs"));
        assert_eq!(storage.write_file("/logs/today", b"hello"), 5);
        assert_eq!(storage.write_file("/eeprom", &[0xAB, 0xCD]), 2);
        assert_eq!(storage.list_directory("/"), vec!["eeprom".to_string()]);
        assert_eq!(storage.file_size("/logs/today"), Ok(5));

        assert!(storage.rename_file("/logs/today", "/logs/old"));
        assert_eq!(storage.read_file("/logs/old"), b"hello".to_vec());
        assert!(!storage.remove_directory("/missing"));
        assert!(storage.remove_directory("/logs"));
        assert!(!storage.directory_exists("/logs"));
        assert!(storage.file_exists("/eeprom"));
    }

    #[test]
    fn test_flash_oversized_write_is_partial() {
        let mut storage = flash_mounted();
        let data = vec![0x55u8; MAX_FILE_SIZE + 1];
        assert_eq!(storage.write_file("/big", &data), MAX_FILE_SIZE);
        assert_eq!(storage.read_file("/big").len(), MAX_FILE_SIZE);
    }

    #[test]
    fn test_flash_failed_commit_writes_nothing() {
        let mut storage = flash_mounted();
        storage.backend_mut().flash().fail_writes_until_format();
        assert_eq!(
            storage.try_write_file("/eeprom", &[1, 2]),
            Err(StorageError::PartialIo {
                expected: 2,
                actual: 0
            })
        );
        assert!(!storage.file_exists("/eeprom"));
        assert_eq!(storage.format(), Ok(()));
        assert_eq!(storage.write_file("/eeprom", &[1, 2]), 2);
    }

    #[test]
    fn test_reserve_path() {
        let mut storage = flash_mounted();
        assert!(storage.reserve_path("/test"));
        assert!(!storage.reserve_path("relative"));
        let mut ram = mounted(RamConfig::block_fs());
        assert!(ram.reserve_path("/test"));
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        "/[a-z_]{1,16}"
    }

    proptest! {
        #[test]
        fn test_round_trip(path in path_strategy(), data in prop::collection::vec(any::<u8>(), 0..1024)) {
            let mut storage = mounted(RamConfig::block_fs());
            prop_assert_eq!(storage.write_file(&path, &data), data.len());
            prop_assert_eq!(storage.read_file(&path), data);
            prop_assert_eq!(storage.backend().open_handles(), 0);
        }

        #[test]
        fn test_flash_round_trip(path in path_strategy(), data in prop::collection::vec(any::<u8>(), 0..MAX_FILE_SIZE)) {
            let mut storage = flash_mounted();
            prop_assert_eq!(storage.write_file(&path, &data), data.len());
            prop_assert_eq!(storage.read_file(&path), data);
        }

        #[test]
        fn test_write_is_idempotent(path in path_strategy(), data in prop::collection::vec(any::<u8>(), 0..512)) {
            let mut storage = mounted(RamConfig::block_fs());
            storage.write_file(&path, &data);
            let first = storage.read_file(&path);
            storage.write_file(&path, &data);
            prop_assert_eq!(storage.read_file(&path), first);
        }

        #[test]
        fn test_remove_then_absent(path in path_strategy(), data in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut storage = mounted(RamConfig::block_fs());
            storage.write_file(&path, &data);
            prop_assert!(storage.remove_file(&path));
            prop_assert!(!storage.file_exists(&path));
        }
    }
}
