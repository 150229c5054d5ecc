//! Entry catalog
//!
//! The map stores one item per file keyed by path, which gives no way to
//! enumerate a directory. The catalog lists every entry with its kind and
//! size. It is held in RAM, loaded on mount, and persisted as a run of
//! shard items of [`SHARD_ENTRIES`] entries each, so a namespace change
//! only rewrites the shards it touches.
//!
//! Shard encoding:
//! - COUNT (1 byte)
//! - per entry: KIND (1 byte, 0 = file, 1 = directory), LEN (4 bytes LE),
//!   PATH_LEN (1 byte), PATH (PATH_LEN bytes)
//!
//! A change spanning two shards is not atomic. Shards are written in
//! ascending order and a path seen twice while loading keeps its last
//! entry, so an interrupted removal leaves a duplicate, never a gap.

use alloc::vec::Vec;

use heapless::String;
use rnode_storage_hal::{BackendError, EntryKind};

/// Longest path the flash back end can key
pub const MAX_PATH_LEN: usize = 64;

/// Entries per shard item
pub const SHARD_ENTRIES: usize = 16;

/// Upper bound on shard items
pub const MAX_SHARDS: usize = 16;

/// Entries allowed per erase block of the partition, one block excluded
pub const ENTRIES_PER_BLOCK: usize = 16;

/// Largest encoded shard
pub const SHARD_MAX_BYTES: usize = 1 + SHARD_ENTRIES * (1 + 4 + 1 + MAX_PATH_LEN);

pub type PathString = String<MAX_PATH_LEN>;

/// Files and directories a partition of `block_count` erase blocks may hold
pub fn entry_limit(block_count: usize) -> usize {
    (block_count.saturating_sub(1) * ENTRIES_PER_BLOCK).min(MAX_SHARDS * SHARD_ENTRIES)
}

/// A single catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub path: PathString,
    pub kind: EntryKind,
    /// File size in bytes, zero for directories
    pub len: u32,
}

impl CatalogEntry {
    pub fn new(path: &str, kind: EntryKind, len: u32) -> Result<Self, BackendError> {
        Ok(Self {
            path: to_path_string(path)?,
            kind,
            len,
        })
    }
}

/// All entries of the filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn get(&self, path: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.path.as_str() == path)
    }

    /// Kind of a path; the root always exists
    pub fn kind_of(&self, path: &str) -> Option<EntryKind> {
        if path == "/" {
            return Some(EntryKind::Directory);
        }
        self.get(path).map(|e| e.kind)
    }

    /// Insert or replace an entry
    ///
    /// The caller enforces the entry limit.
    pub fn insert(&mut self, entry: CatalogEntry) {
        match self.entries.iter_mut().find(|e| e.path == entry.path) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Remove an entry, moving the last one into its slot
    pub fn remove(&mut self, path: &str) -> Option<CatalogEntry> {
        let idx = self.entries.iter().position(|e| e.path.as_str() == path)?;
        Some(self.entries.swap_remove(idx))
    }

    /// Immediate children of a directory
    pub fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| parent_of(e.path.as_str()) == dir)
    }

    pub fn has_children(&self, dir: &str) -> bool {
        self.children(dir).next().is_some()
    }

    /// Entries at or below `path`
    pub fn subtree_paths(&self, path: &str) -> Vec<PathString> {
        self.entries
            .iter()
            .filter(|e| is_within(e.path.as_str(), path))
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut CatalogEntry> {
        self.entries.iter_mut()
    }

    /// Shard items needed to persist the catalog
    pub fn shard_count(&self) -> usize {
        self.entries.len().div_ceil(SHARD_ENTRIES)
    }

    /// Entries stored in shard `index`, empty past the last shard
    pub fn shard(&self, index: usize) -> &[CatalogEntry] {
        let start = (index * SHARD_ENTRIES).min(self.entries.len());
        let end = (start + SHARD_ENTRIES).min(self.entries.len());
        &self.entries[start..end]
    }

    /// Size of an encoded shard in bytes
    pub fn encoded_len(&self, index: usize) -> usize {
        1 + self
            .shard(index)
            .iter()
            .map(|e| 1 + 4 + 1 + e.path.len())
            .sum::<usize>()
    }

    /// Serialize shard `index` into `buf`, returning the encoded length
    pub fn encode_shard(&self, index: usize, buf: &mut [u8]) -> Result<usize, BackendError> {
        let shard = self.shard(index);
        let mut pos = 0;
        put(buf, &mut pos, &[shard.len() as u8])?;
        for entry in shard {
            let kind = match entry.kind {
                EntryKind::File => 0u8,
                EntryKind::Directory => 1u8,
            };
            put(buf, &mut pos, &[kind])?;
            put(buf, &mut pos, &entry.len.to_le_bytes())?;
            put(buf, &mut pos, &[entry.path.len() as u8])?;
            put(buf, &mut pos, entry.path.as_bytes())?;
        }
        Ok(pos)
    }

    /// Parse an encoded shard and add its entries, returning how many it held
    pub fn decode_shard(&mut self, buf: &[u8]) -> Result<usize, BackendError> {
        let mut pos = 0;
        let count = take(buf, &mut pos, 1)?[0] as usize;
        if count > SHARD_ENTRIES {
            return Err(BackendError::Corrupted);
        }

        for _ in 0..count {
            let kind = match take(buf, &mut pos, 1)?[0] {
                0 => EntryKind::File,
                1 => EntryKind::Directory,
                _ => return Err(BackendError::Corrupted),
            };
            let len_bytes = take(buf, &mut pos, 4)?;
            let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
            let path_len = take(buf, &mut pos, 1)?[0] as usize;
            let path = core::str::from_utf8(take(buf, &mut pos, path_len)?)
                .map_err(|_| BackendError::Corrupted)?;
            let entry = CatalogEntry::new(path, kind, len).map_err(|_| BackendError::Corrupted)?;
            self.insert(entry);
        }
        Ok(count)
    }
}

pub fn to_path_string(path: &str) -> Result<PathString, BackendError> {
    let mut out = PathString::new();
    out.push_str(path).map_err(|_| BackendError::InvalidPath)?;
    Ok(out)
}

pub fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// `path` equals `root` or lies below it
pub fn is_within(path: &str, root: &str) -> bool {
    path == root
        || (path.starts_with(root) && path.as_bytes().get(root.len()) == Some(&b'/'))
}

fn put(buf: &mut [u8], pos: &mut usize, bytes: &[u8]) -> Result<(), BackendError> {
    let end = *pos + bytes.len();
    if end > buf.len() {
        return Err(BackendError::NoSpace);
    }
    buf[*pos..end].copy_from_slice(bytes);
    *pos = end;
    Ok(())
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], BackendError> {
    let end = *pos + len;
    if end > buf.len() {
        return Err(BackendError::Corrupted);
    }
    let out = &buf[*pos..end];
    *pos = end;
    Ok(out)
}
