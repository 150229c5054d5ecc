//! Flash filesystem on a sequential-storage map
//!
//! Each file is one map item: key = path, value = content. Writes are
//! buffered in the open handle and committed as a single item on close, so
//! a file is either fully replaced or left untouched.

use alloc::vec::Vec;
use core::ops::Range;

use embassy_futures::block_on;
use embedded_storage_async::nor_flash::MultiwriteNorFlash;
use rnode_storage_hal::{BackendError, Capacity, EntryKind, FlashFilesystem, OpenMode};
use sequential_storage::cache::NoCache;
use sequential_storage::map::{self, Key, SerializationError};

use crate::catalog::{
    self, is_within, parent_of, to_path_string, Catalog, CatalogEntry, PathString, MAX_PATH_LEN,
    SHARD_MAX_BYTES,
};

/// Largest file the back end stores
pub const MAX_FILE_SIZE: usize = 1024;

/// Scratch buffer for map operations (key + value + item header)
pub const ITEM_BUFFER_SIZE: usize = 2048;

/// Per-item header bytes kept by sequential-storage
const ITEM_HEADER_SIZE: usize = 8;

/// Map key
///
/// Files are keyed by their length-prefixed path. A zero length prefix
/// followed by an index keys a catalog shard.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemKey {
    Shard(u8),
    File(PathString),
}

impl ItemKey {
    fn file(path: &str) -> Result<Self, BackendError> {
        validate(path)?;
        if path == "/" {
            return Err(BackendError::IsADirectory);
        }
        Ok(ItemKey::File(to_path_string(path)?))
    }
}

impl Key for ItemKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        match self {
            ItemKey::Shard(index) => {
                if buffer.len() < 2 {
                    return Err(SerializationError::BufferTooSmall);
                }
                buffer[0] = 0;
                buffer[1] = *index;
                Ok(2)
            }
            ItemKey::File(path) => {
                let bytes = path.as_bytes();
                if buffer.len() < bytes.len() + 1 {
                    return Err(SerializationError::BufferTooSmall);
                }
                buffer[0] = bytes.len() as u8;
                buffer[1..=bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len() + 1)
            }
        }
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError> {
        let len = *buffer.first().ok_or(SerializationError::BufferTooSmall)? as usize;
        if len == 0 {
            let index = *buffer.get(1).ok_or(SerializationError::BufferTooSmall)?;
            return Ok((ItemKey::Shard(index), 2));
        }
        let bytes = buffer
            .get(1..=len)
            .ok_or(SerializationError::BufferTooSmall)?;
        let text = core::str::from_utf8(bytes).map_err(|_| SerializationError::InvalidFormat)?;
        let path = to_path_string(text).map_err(|_| SerializationError::InvalidFormat)?;
        Ok((ItemKey::File(path), len + 1))
    }
}

/// Open file handle
///
/// Holds the whole file content; read handles are filled on open, write
/// handles are committed on close.
#[derive(Debug)]
pub struct FlashFile {
    path: PathString,
    mode: OpenMode,
    data: heapless::Vec<u8, MAX_FILE_SIZE>,
    pos: usize,
}

/// Filesystem stored in a NOR flash partition
pub struct SequentialFilesystem<F> {
    flash: F,
    range: Range<u32>,
    catalog: Catalog,
    /// Shard items present on flash
    stored_shards: usize,
    /// Flash shards match the in-RAM layout
    synced: bool,
    reserved: Option<PathString>,
    mounted: bool,
    buffer: [u8; ITEM_BUFFER_SIZE],
}

impl<F: MultiwriteNorFlash> SequentialFilesystem<F> {
    /// Create an unmounted filesystem over `range` of `flash`
    ///
    /// The range must be aligned to `F::ERASE_SIZE` and span at least two
    /// erase blocks; this is checked on mount and format.
    pub fn new(flash: F, range: Range<u32>) -> Self {
        Self {
            flash,
            range,
            catalog: Catalog::new(),
            stored_shards: 0,
            synced: true,
            reserved: None,
            mounted: false,
            buffer: [0u8; ITEM_BUFFER_SIZE],
        }
    }

    /// Get the raw flash for low-level access
    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Release the underlying flash
    pub fn into_flash(self) -> F {
        self.flash
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Files and directories this partition can hold
    pub fn entry_limit(&self) -> usize {
        catalog::entry_limit(self.block_count())
    }

    fn block_count(&self) -> usize {
        self.range.end.saturating_sub(self.range.start) as usize / F::ERASE_SIZE
    }

    fn ensure_mounted(&self) -> Result<(), BackendError> {
        if self.mounted {
            Ok(())
        } else {
            Err(BackendError::NotMounted)
        }
    }

    fn check_layout(&self) -> Result<(), BackendError> {
        let erase = F::ERASE_SIZE as u32;
        let aligned = self.range.start % erase == 0 && self.range.end % erase == 0;
        if !aligned || self.block_count() < 2 || self.range.end as usize > self.flash.capacity() {
            error!(
                "flash range {}..{} unusable (erase size {})",
                self.range.start,
                self.range.end,
                erase
            );
            return Err(BackendError::Unsupported);
        }
        Ok(())
    }

    fn fetch_into(&mut self, key: &ItemKey, out: &mut [u8]) -> Result<Option<usize>, BackendError> {
        let result = block_on(map::fetch_item::<ItemKey, &[u8], _>(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.buffer,
            key,
        ));

        match result {
            Ok(Some(data)) => {
                if data.len() > out.len() {
                    return Err(BackendError::Corrupted);
                }
                out[..data.len()].copy_from_slice(data);
                Ok(Some(data.len()))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(map_storage_error(e)),
        }
    }

    fn store(&mut self, key: &ItemKey, data: &[u8]) -> Result<(), BackendError> {
        block_on(map::store_item(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.buffer,
            key,
            &data,
        ))
        .map_err(map_storage_error)
    }

    fn erase_item(&mut self, key: &ItemKey) -> Result<(), BackendError> {
        block_on(map::remove_item(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.buffer,
            key,
        ))
        .map_err(map_storage_error)
    }

    /// Read shards until the first missing one
    fn load_catalog(&mut self) -> Result<(), BackendError> {
        let mut loaded = Catalog::new();
        let mut encoded = [0u8; SHARD_MAX_BYTES];
        let mut found = 0;
        let mut decoded = 0;
        for index in 0..catalog::MAX_SHARDS {
            match self.fetch_into(&ItemKey::Shard(index as u8), &mut encoded)? {
                Some(len) => decoded += loaded.decode_shard(&encoded[..len])?,
                None => break,
            }
            found += 1;
        }

        // Duplicates from an interrupted update shift the layout
        self.synced = decoded == loaded.len();
        if !self.synced {
            warn!("catalog held {} duplicate entries", decoded - loaded.len());
        }
        self.stored_shards = found;
        self.catalog = loaded;
        Ok(())
    }

    /// Apply `change` to a copy of the catalog, persist it, then adopt it
    ///
    /// Only shards whose entries changed are rewritten; shards past the new
    /// end are removed.
    fn update_catalog(
        &mut self,
        change: impl FnOnce(&mut Catalog) -> Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        let mut next = self.catalog.clone();
        change(&mut next)?;

        // A failure part way leaves flash out of step with RAM
        let rewrite_all = !self.synced;
        self.synced = false;
        self.stored_shards = self.stored_shards.max(next.shard_count());

        let mut encoded = [0u8; SHARD_MAX_BYTES];
        for index in 0..next.shard_count() {
            if !rewrite_all && next.shard(index) == self.catalog.shard(index) {
                continue;
            }
            let len = next.encode_shard(index, &mut encoded)?;
            self.store(&ItemKey::Shard(index as u8), &encoded[..len])?;
        }
        while self.stored_shards > next.shard_count() {
            self.erase_item(&ItemKey::Shard(self.stored_shards as u8 - 1))?;
            self.stored_shards -= 1;
        }
        self.synced = true;
        self.catalog = next;
        Ok(())
    }

    /// A new entry for `path` fits, keeping the reserved slot free for
    /// everything else
    fn has_room_for(&self, path: &str) -> bool {
        let held = match &self.reserved {
            Some(reserved) if reserved.as_str() != path && self.catalog.get(reserved).is_none() => {
                1
            }
            _ => 0,
        };
        self.catalog.len() + held < self.entry_limit()
    }

    fn require_room_for(&self, path: &str) -> Result<(), BackendError> {
        if self.has_room_for(path) {
            Ok(())
        } else {
            warn!("catalog full ({} entries), cannot add {}", self.catalog.len(), path);
            Err(BackendError::NoSpace)
        }
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), BackendError> {
        match self.catalog.kind_of(parent_of(path)) {
            Some(EntryKind::Directory) => Ok(()),
            Some(EntryKind::File) => Err(BackendError::NotADirectory),
            None => Err(BackendError::NotFound),
        }
    }

    /// Bytes an item occupies on flash, header included
    fn footprint(key_len: usize, value_len: usize) -> usize {
        let body = key_len + value_len;
        ITEM_HEADER_SIZE + body.div_ceil(F::WRITE_SIZE) * F::WRITE_SIZE
    }
}

impl<F: MultiwriteNorFlash> FlashFilesystem for SequentialFilesystem<F> {
    type File = FlashFile;

    fn mount(&mut self) -> Result<(), BackendError> {
        self.check_layout()?;
        match self.load_catalog() {
            Ok(()) => {
                debug!("flash filesystem mounted, {} entries", self.catalog.len());
                self.mounted = true;
                Ok(())
            }
            Err(e) => {
                error!("flash catalog unreadable: {:?}", e);
                self.mounted = false;
                Err(e)
            }
        }
    }

    fn format(&mut self) -> Result<(), BackendError> {
        self.check_layout()?;
        block_on(self.flash.erase(self.range.start, self.range.end)).map_err(|_| {
            error!("flash erase failed");
            BackendError::Io
        })?;
        self.catalog = Catalog::new();
        self.stored_shards = 0;
        self.synced = true;
        self.mounted = true;
        Ok(())
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FlashFile, BackendError> {
        self.ensure_mounted()?;
        let key = ItemKey::file(path)?;

        let mut data = heapless::Vec::new();
        match mode {
            OpenMode::Read => {
                match self.catalog.kind_of(path) {
                    Some(EntryKind::File) => {}
                    Some(EntryKind::Directory) => return Err(BackendError::IsADirectory),
                    None => return Err(BackendError::NotFound),
                }
                data.resize(MAX_FILE_SIZE, 0)
                    .map_err(|_| BackendError::NoSpace)?;
                match self.fetch_into(&key, &mut data)? {
                    Some(len) => data.truncate(len),
                    None => {
                        warn!("catalogued file {} has no flash item", path);
                        return Err(BackendError::Corrupted);
                    }
                }
            }
            OpenMode::WriteTruncate => match self.catalog.kind_of(path) {
                Some(EntryKind::Directory) => return Err(BackendError::IsADirectory),
                Some(EntryKind::File) => {}
                None => {
                    self.require_parent_dir(path)?;
                    self.require_room_for(path)?;
                }
            },
        }

        let ItemKey::File(path) = key else {
            return Err(BackendError::InvalidPath);
        };
        Ok(FlashFile {
            path,
            mode,
            data,
            pos: 0,
        })
    }

    fn file_len(&mut self, file: &FlashFile) -> Result<usize, BackendError> {
        Ok(file.data.len())
    }

    fn read(&mut self, file: &mut FlashFile, buf: &mut [u8]) -> Result<usize, BackendError> {
        let start = file.pos.min(file.data.len());
        let count = buf.len().min(file.data.len() - start);
        buf[..count].copy_from_slice(&file.data[start..start + count]);
        file.pos = start + count;
        Ok(count)
    }

    fn write(&mut self, file: &mut FlashFile, data: &[u8]) -> Result<usize, BackendError> {
        if file.mode != OpenMode::WriteTruncate {
            return Err(BackendError::Unsupported);
        }
        let accepted = data.len().min(MAX_FILE_SIZE - file.data.len());
        file.data
            .extend_from_slice(&data[..accepted])
            .map_err(|_| BackendError::NoSpace)?;
        file.pos += accepted;
        Ok(accepted)
    }

    fn close(&mut self, file: FlashFile) -> Result<(), BackendError> {
        if file.mode != OpenMode::WriteTruncate {
            return Ok(());
        }

        let key = ItemKey::File(file.path.clone());
        if let Err(e) = self.store(&key, &file.data) {
            warn!("flash item store for {} failed: {:?}", file.path.as_str(), e);
            return Err(e);
        }

        let entry = CatalogEntry {
            path: file.path,
            kind: EntryKind::File,
            len: file.data.len() as u32,
        };
        self.update_catalog(|catalog| {
            catalog.insert(entry);
            Ok(())
        })
    }

    fn stat(&mut self, path: &str) -> Result<Option<EntryKind>, BackendError> {
        self.ensure_mounted()?;
        validate(path)?;
        Ok(self.catalog.kind_of(path))
    }

    fn remove(&mut self, path: &str) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        let key = ItemKey::file(path)?;
        match self.catalog.kind_of(path) {
            Some(EntryKind::File) => {}
            Some(EntryKind::Directory) => return Err(BackendError::IsADirectory),
            None => return Err(BackendError::NotFound),
        }

        self.erase_item(&key)?;
        self.update_catalog(|catalog| {
            catalog.remove(path);
            Ok(())
        })
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        validate(from)?;
        validate(to)?;
        if from == "/" || (to != from && is_within(to, from)) {
            return Err(BackendError::InvalidPath);
        }
        let kind = self.catalog.kind_of(from).ok_or(BackendError::NotFound)?;
        self.require_parent_dir(to)?;
        if from == to {
            return Ok(());
        }
        match (kind, self.catalog.kind_of(to)) {
            (_, Some(EntryKind::Directory)) => return Err(BackendError::AlreadyExists),
            (EntryKind::Directory, Some(EntryKind::File)) => {
                return Err(BackendError::NotADirectory)
            }
            _ => {}
        }

        // Work out every new path before touching flash
        let mut targets: Vec<(PathString, PathString)> = Vec::new();
        for old in self.catalog.subtree_paths(from) {
            let suffix = &old.as_str()[from.len()..];
            if to.len() + suffix.len() > MAX_PATH_LEN {
                return Err(BackendError::InvalidPath);
            }
            let mut new = to_path_string(to)?;
            new.push_str(suffix).map_err(|_| BackendError::InvalidPath)?;
            targets.push((old, new));
        }

        // Copy file items under their new keys
        let mut content = [0u8; MAX_FILE_SIZE];
        for (old, new) in &targets {
            if self.catalog.kind_of(old) != Some(EntryKind::File) {
                continue;
            }
            let len = self
                .fetch_into(&ItemKey::File(old.clone()), &mut content)?
                .ok_or(BackendError::Corrupted)?;
            self.store(&ItemKey::File(new.clone()), &content[..len])?;
        }

        self.update_catalog(|catalog| {
            catalog.remove(to);
            for entry in catalog.entries_mut() {
                if let Some((_, new)) = targets.iter().find(|(old, _)| *old == entry.path) {
                    entry.path = new.clone();
                }
            }
            Ok(())
        })?;

        // Old items are unreachable now; dropping them only reclaims space
        for (old, _) in &targets {
            if let Err(e) = self.erase_item(&ItemKey::File(old.clone())) {
                warn!("stale flash item {} not removed: {:?}", old.as_str(), e);
            }
        }
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        validate(path)?;
        if self.catalog.kind_of(path).is_some() {
            return Err(BackendError::AlreadyExists);
        }
        self.require_parent_dir(path)?;
        self.require_room_for(path)?;
        let entry = CatalogEntry::new(path, EntryKind::Directory, 0)?;
        self.update_catalog(|catalog| {
            catalog.insert(entry);
            Ok(())
        })
    }

    fn rmdir(&mut self, path: &str) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        validate(path)?;
        if path == "/" {
            return Err(BackendError::InvalidPath);
        }
        match self.catalog.kind_of(path) {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(BackendError::NotADirectory),
            None => return Err(BackendError::NotFound),
        }
        if self.catalog.has_children(path) {
            return Err(BackendError::DirectoryNotEmpty);
        }
        self.update_catalog(|catalog| {
            catalog.remove(path);
            Ok(())
        })
    }

    fn rmdir_is_recursive(&self) -> bool {
        false
    }

    /// Children are visited in name order
    fn list_children(
        &mut self,
        path: &str,
        visitor: &mut dyn FnMut(&str, EntryKind),
    ) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        validate(path)?;
        match self.catalog.kind_of(path) {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(BackendError::NotADirectory),
            None => return Err(BackendError::NotFound),
        }

        let prefix_len = if path == "/" { 1 } else { path.len() + 1 };
        let mut children: Vec<(&str, EntryKind)> = self
            .catalog
            .children(path)
            .map(|entry| (&entry.path.as_str()[prefix_len..], entry.kind))
            .collect();
        children.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (name, kind) in children {
            visitor(name, kind);
        }
        Ok(())
    }

    /// Walks the catalog to estimate occupied erase blocks
    ///
    /// One block is always counted as used: sequential-storage keeps a free
    /// page for garbage collection. Superseded items awaiting collection are
    /// not counted.
    fn capacity(&mut self) -> Result<Capacity, BackendError> {
        self.ensure_mounted()?;
        let block_size = F::ERASE_SIZE;
        let block_count = self.block_count();

        let mut used: usize = (0..self.catalog.shard_count())
            .map(|index| Self::footprint(2, self.catalog.encoded_len(index)))
            .sum();
        for entry in self.catalog.iter().filter(|e| e.kind.is_file()) {
            used += Self::footprint(entry.path.len() + 1, entry.len as usize);
        }

        Ok(Capacity::Blocks {
            block_size,
            block_count,
            used_blocks: used.div_ceil(block_size) + 1,
        })
    }

    fn reserve(&mut self, path: &str) -> Result<(), BackendError> {
        validate(path)?;
        debug!("catalog slot reserved for {}", path);
        self.reserved = Some(to_path_string(path)?);
        Ok(())
    }

    fn max_path_len(&self) -> Option<usize> {
        Some(MAX_PATH_LEN)
    }
}

fn validate(path: &str) -> Result<(), BackendError> {
    if !path.starts_with('/') || path.len() > MAX_PATH_LEN {
        return Err(BackendError::InvalidPath);
    }
    if path.len() > 1 && (path.ends_with('/') || path.contains("//")) {
        return Err(BackendError::InvalidPath);
    }
    Ok(())
}

fn map_storage_error<E>(e: sequential_storage::Error<E>) -> BackendError {
    match e {
        sequential_storage::Error::FullStorage => BackendError::NoSpace,
        sequential_storage::Error::Corrupted { .. } => BackendError::Corrupted,
        _ => BackendError::Io,
    }
}
