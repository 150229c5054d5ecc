//! Filesystem inspection
//!
//! Depth-first walkers used from a debug console or during bring-up to see
//! what is on the flash.

use alloc::vec::Vec;

use rnode_storage_hal::{EntryKind, FlashFilesystem};

use crate::error::StorageError;
use crate::path::FilePath;
use crate::storage::Storage;

/// Bytes of each file shown by [`dump_tree`]
pub const DUMP_PREVIEW_LEN: usize = 4096;

/// One entry found by [`walk`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: FilePath,
    pub kind: EntryKind,
    /// 0 for direct children of the walk root
    pub depth: usize,
    /// File size in bytes, `None` for directories or unreadable files
    pub size: Option<usize>,
}

/// Visit every entry below `root`, parents before children
pub fn walk<B: FlashFilesystem>(
    storage: &mut Storage<B>,
    root: &str,
    visitor: &mut dyn FnMut(&TreeEntry),
) -> Result<(), StorageError> {
    let root = FilePath::new(root)?;
    walk_dir(storage, &root, 0, visitor)
}

fn walk_dir<B: FlashFilesystem>(
    storage: &mut Storage<B>,
    dir: &FilePath,
    depth: usize,
    visitor: &mut dyn FnMut(&TreeEntry),
) -> Result<(), StorageError> {
    for (name, kind) in storage.children(dir)? {
        let path = dir.join(&name)?;
        let size = match kind {
            EntryKind::File => storage.file_size(path.as_str()).ok(),
            EntryKind::Directory => None,
        };
        let entry = TreeEntry {
            path,
            kind,
            depth,
            size,
        };
        visitor(&entry);
        if kind.is_dir() {
            walk_dir(storage, &entry.path, depth + 1, visitor)?;
        }
    }
    Ok(())
}

/// Collect every entry below `root`
pub fn tree<B: FlashFilesystem>(
    storage: &mut Storage<B>,
    root: &str,
) -> Result<Vec<TreeEntry>, StorageError> {
    let mut entries = Vec::new();
    walk(storage, root, &mut |entry| entries.push(entry.clone()))?;
    Ok(entries)
}

/// Log the tree below `root` with file sizes, returning the entry count
pub fn list_tree<B: FlashFilesystem>(storage: &mut Storage<B>, root: &str) -> usize {
    let mut count = 0;
    let result = walk(storage, root, &mut |entry| {
        count += 1;
        match entry.kind {
            EntryKind::Directory => info!("[{}] {}/", entry.depth, entry.path),
            EntryKind::File => info!(
                "[{}] {} ({} bytes)",
                entry.depth,
                entry.path,
                entry.size.unwrap_or(0)
            ),
        }
    });
    if let Err(e) = result {
        error!("list_tree: failed to open directory {}: {:?}", root, e);
    }
    count
}

/// Log every file below `root` with the start of its content
///
/// Returns the number of files dumped.
pub fn dump_tree<B: FlashFilesystem>(storage: &mut Storage<B>, root: &str) -> usize {
    let entries = match tree(storage, root) {
        Ok(entries) => entries,
        Err(e) => {
            error!("dump_tree: failed to open directory {}: {:?}", root, e);
            return 0;
        }
    };

    let mut dumped = 0;
    for entry in entries.iter().filter(|e| e.kind.is_file()) {
        match storage.preview(&entry.path, DUMP_PREVIEW_LEN) {
            Ok(data) => {
                info!(
                    "{} ({} bytes): {:?}",
                    entry.path,
                    entry.size.unwrap_or(data.len()),
                    data.as_slice()
                );
                dumped += 1;
            }
            Err(e) => warn!("dump_tree: could not read {}: {:?}", entry.path, e),
        }
    }
    dumped
}
