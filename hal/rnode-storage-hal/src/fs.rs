//! Flash filesystem abstractions
//!
//! Primitive operations a flash filesystem engine provides. Back ends differ
//! in how they report capacity and whether `rmdir` is recursive; both are
//! surfaced here so the core can normalize them.

/// Mode a file is opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenMode {
    /// Read from the start of an existing file
    Read,
    /// Create the file, discarding any previous content
    WriteTruncate,
}

/// Kind of a namespace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_file(self) -> bool {
        self == EntryKind::File
    }

    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/// Capacity as reported by a back end
///
/// Some engines expose byte counters directly, others only block
/// accounting obtained by traversing allocation metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Capacity {
    Bytes {
        total: usize,
        used: usize,
    },
    Blocks {
        block_size: usize,
        block_count: usize,
        used_blocks: usize,
    },
}

impl Capacity {
    /// Total capacity in bytes
    pub fn total_bytes(&self) -> usize {
        match *self {
            Capacity::Bytes { total, .. } => total,
            Capacity::Blocks {
                block_size,
                block_count,
                ..
            } => block_size.saturating_mul(block_count),
        }
    }

    /// Used capacity in bytes
    pub fn used_bytes(&self) -> usize {
        match *self {
            Capacity::Bytes { used, .. } => used,
            Capacity::Blocks {
                block_size,
                used_blocks,
                ..
            } => block_size.saturating_mul(used_blocks),
        }
    }

    /// Free capacity in bytes, never negative
    pub fn available_bytes(&self) -> usize {
        self.total_bytes().saturating_sub(self.used_bytes())
    }
}

/// Errors from back-end operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackendError {
    /// Filesystem is not mounted
    NotMounted,
    /// Path does not exist
    NotFound,
    /// Path already exists
    AlreadyExists,
    /// A path component is not a directory
    NotADirectory,
    /// Operation expected a file but found a directory
    IsADirectory,
    /// Directory still has children
    DirectoryNotEmpty,
    /// No space left on the device
    NoSpace,
    /// Path is malformed or too long for this engine
    InvalidPath,
    /// On-flash metadata is inconsistent
    Corrupted,
    /// Engine does not provide this operation
    Unsupported,
    /// Low-level flash I/O failed
    Io,
}

/// Flash filesystem trait
///
/// Implemented once per back end. All calls block until the flash
/// operation completes; there are no suspension points.
///
/// Paths are absolute, slash-delimited strings. A handle returned by
/// [`open`](FlashFilesystem::open) must be passed back to
/// [`close`](FlashFilesystem::close) exactly once.
pub trait FlashFilesystem {
    /// Open file handle
    type File;

    /// Attach the filesystem so that other operations become valid
    fn mount(&mut self) -> Result<(), BackendError>;

    /// Destructive low-level format. Erases everything.
    ///
    /// On success the filesystem is empty and usable without a separate
    /// mount.
    fn format(&mut self) -> Result<(), BackendError>;

    /// Open a file
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::File, BackendError>;

    /// Size in bytes of an open file
    fn file_len(&mut self, file: &Self::File) -> Result<usize, BackendError>;

    /// Read up to `buf.len()` bytes, returning the number transferred
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, BackendError>;

    /// Write `data`, returning the number of bytes accepted
    ///
    /// A short count means the engine ran out of space or truncated the
    /// write.
    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, BackendError>;

    /// Close a handle, flushing pending writes
    ///
    /// An error after writing means the written data was not persisted.
    fn close(&mut self, file: Self::File) -> Result<(), BackendError>;

    /// Look up a path, `None` when absent
    fn stat(&mut self, path: &str) -> Result<Option<EntryKind>, BackendError>;

    /// Remove a file
    fn remove(&mut self, path: &str) -> Result<(), BackendError>;

    /// Rename a file or directory
    fn rename(&mut self, from: &str, to: &str) -> Result<(), BackendError>;

    /// Create a directory
    fn mkdir(&mut self, path: &str) -> Result<(), BackendError>;

    /// Remove a directory
    ///
    /// Recursive when [`rmdir_is_recursive`](FlashFilesystem::rmdir_is_recursive)
    /// returns true, otherwise fails with [`BackendError::DirectoryNotEmpty`].
    fn rmdir(&mut self, path: &str) -> Result<(), BackendError>;

    /// Whether [`rmdir`](FlashFilesystem::rmdir) removes children itself
    fn rmdir_is_recursive(&self) -> bool;

    /// Visit the immediate children of a directory
    ///
    /// Names passed to the visitor are bare entry names, not full paths.
    fn list_children(
        &mut self,
        path: &str,
        visitor: &mut dyn FnMut(&str, EntryKind),
    ) -> Result<(), BackendError>;

    /// Capacity accounting
    fn capacity(&mut self) -> Result<Capacity, BackendError>;

    /// Keep one namespace entry free for `path`
    ///
    /// Creating `path` then never fails because the entry table is full.
    /// Engines without a bounded entry table ignore this.
    fn reserve(&mut self, _path: &str) -> Result<(), BackendError> {
        Ok(())
    }

    /// Longest path the engine accepts, `None` when it imposes no limit
    fn max_path_len(&self) -> Option<usize> {
        None
    }
}
