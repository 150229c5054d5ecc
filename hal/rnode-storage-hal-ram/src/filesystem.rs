//! In-memory filesystem implementation

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use rnode_storage_hal::{BackendError, Capacity, EntryKind, FlashFilesystem, OpenMode};

use crate::faults::Faults;

/// How capacity is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accounting {
    /// Direct total/used byte counters
    Bytes,
    /// Block size, block count and traversed used blocks
    Blocks,
}

/// Geometry and behaviour of a simulated engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamConfig {
    pub block_size: usize,
    pub block_count: usize,
    pub accounting: Accounting,
    pub recursive_rmdir: bool,
    /// Engine supports directories at all
    pub directories: bool,
}

impl RamConfig {
    /// Wear-levelled block filesystem on external flash
    pub const fn block_fs() -> Self {
        Self {
            block_size: 4096,
            block_count: 32,
            accounting: Accounting::Bytes,
            recursive_rmdir: false,
            directories: true,
        }
    }

    /// Alternative flash filesystem with a flat namespace
    pub const fn alt_fs() -> Self {
        Self {
            block_size: 256,
            block_count: 512,
            accounting: Accounting::Bytes,
            recursive_rmdir: false,
            directories: false,
        }
    }

    /// Internal-flash filesystem reporting block traversal counts
    pub const fn internal_fs() -> Self {
        Self {
            block_size: 4096,
            block_count: 7,
            accounting: Accounting::Blocks,
            recursive_rmdir: true,
            directories: true,
        }
    }

    /// Override the number of blocks
    pub const fn with_block_count(mut self, block_count: usize) -> Self {
        self.block_count = block_count;
        self
    }
}

impl Default for RamConfig {
    fn default() -> Self {
        Self::block_fs()
    }
}

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

/// Open file handle
#[derive(Debug)]
pub struct RamFile {
    path: String,
    mode: OpenMode,
    pos: usize,
}

/// RAM-resident filesystem
#[derive(Debug)]
pub struct RamFilesystem {
    config: RamConfig,
    faults: Faults,
    mounted: bool,
    nodes: BTreeMap<String, Node>,
    open_handles: usize,
    format_count: usize,
}

impl Default for RamFilesystem {
    fn default() -> Self {
        Self::new(RamConfig::default())
    }
}

impl RamFilesystem {
    /// Create an unmounted, empty filesystem
    pub fn new(config: RamConfig) -> Self {
        Self {
            config,
            faults: Faults::none(),
            mounted: false,
            nodes: BTreeMap::new(),
            open_handles: 0,
            format_count: 0,
        }
    }

    /// Builder-style fault injection
    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    pub fn config(&self) -> &RamConfig {
        &self.config
    }

    /// Number of handles opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.open_handles
    }

    /// Number of successful formats since creation
    pub fn format_count(&self) -> usize {
        self.format_count
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn ensure_mounted(&self) -> Result<(), BackendError> {
        if self.mounted {
            Ok(())
        } else {
            Err(BackendError::NotMounted)
        }
    }

    fn kind_of(&self, path: &str) -> Option<EntryKind> {
        if path == "/" {
            return Some(EntryKind::Directory);
        }
        self.nodes.get(path).map(|node| match node {
            Node::File(_) => EntryKind::File,
            Node::Dir => EntryKind::Directory,
        })
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), BackendError> {
        match self.kind_of(parent_of(path)) {
            Some(EntryKind::Directory) => Ok(()),
            Some(EntryKind::File) => Err(BackendError::NotADirectory),
            None => Err(BackendError::NotFound),
        }
    }

    fn blocks_for(&self, len: usize) -> usize {
        len.div_ceil(self.config.block_size).max(1)
    }

    fn used_blocks(&self) -> usize {
        self.nodes
            .values()
            .map(|node| match node {
                Node::File(data) => self.blocks_for(data.len()),
                Node::Dir => 1,
            })
            .sum()
    }

    fn free_blocks(&self) -> usize {
        self.config.block_count.saturating_sub(self.used_blocks())
    }

    fn has_children(&self, path: &str) -> bool {
        self.nodes.keys().any(|key| parent_of(key) == path)
    }

    fn remove_subtree(&mut self, path: &str) {
        let prefix = child_prefix(path);
        self.nodes
            .retain(|key, _| key != path && !key.starts_with(prefix.as_str()));
    }
}

impl FlashFilesystem for RamFilesystem {
    type File = RamFile;

    fn mount(&mut self) -> Result<(), BackendError> {
        if self.faults.fail_mount {
            return Err(BackendError::Corrupted);
        }
        self.mounted = true;
        Ok(())
    }

    fn format(&mut self) -> Result<(), BackendError> {
        if self.faults.fail_format {
            return Err(BackendError::Io);
        }
        self.nodes.clear();
        self.faults.heal();
        self.mounted = true;
        self.format_count += 1;
        Ok(())
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<RamFile, BackendError> {
        self.ensure_mounted()?;
        validate(path)?;

        match mode {
            OpenMode::Read => match self.kind_of(path) {
                Some(EntryKind::File) => {}
                Some(EntryKind::Directory) => return Err(BackendError::IsADirectory),
                None => return Err(BackendError::NotFound),
            },
            OpenMode::WriteTruncate => {
                if self.faults.write_open_fails(path) {
                    return Err(BackendError::Io);
                }
                self.require_parent_dir(path)?;
                match self.nodes.get(path) {
                    Some(Node::Dir) => return Err(BackendError::IsADirectory),
                    Some(Node::File(_)) => {}
                    None if self.free_blocks() == 0 => return Err(BackendError::NoSpace),
                    None => {}
                }
                self.nodes.insert(path.to_string(), Node::File(Vec::new()));
            }
        }

        self.open_handles += 1;
        Ok(RamFile {
            path: path.to_string(),
            mode,
            pos: 0,
        })
    }

    fn file_len(&mut self, file: &RamFile) -> Result<usize, BackendError> {
        match self.nodes.get(&file.path) {
            Some(Node::File(data)) => Ok(data.len()),
            Some(Node::Dir) => Err(BackendError::IsADirectory),
            None => Err(BackendError::NotFound),
        }
    }

    fn read(&mut self, file: &mut RamFile, buf: &mut [u8]) -> Result<usize, BackendError> {
        let data = match self.nodes.get(&file.path) {
            Some(Node::File(data)) => data,
            Some(Node::Dir) => return Err(BackendError::IsADirectory),
            None => return Err(BackendError::NotFound),
        };

        let readable = match self.faults.read_limit {
            Some(limit) => data.len().min(limit),
            None => data.len(),
        };
        let start = file.pos.min(readable);
        let count = buf.len().min(readable - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        file.pos = start + count;
        Ok(count)
    }

    fn write(&mut self, file: &mut RamFile, data: &[u8]) -> Result<usize, BackendError> {
        if file.mode != OpenMode::WriteTruncate {
            return Err(BackendError::Unsupported);
        }

        let current = match self.nodes.get(&file.path) {
            Some(Node::File(existing)) => existing.len(),
            _ => return Err(BackendError::NotFound),
        };

        // Largest length this file may grow to within the free blocks
        let max_len = (self.blocks_for(current) + self.free_blocks()) * self.config.block_size;
        let mut accepted = data.len().min(max_len.saturating_sub(current));
        if let Some(limit) = self.faults.write_limit {
            accepted = accepted.min(limit.saturating_sub(current));
        }

        if let Some(Node::File(existing)) = self.nodes.get_mut(&file.path) {
            existing.extend_from_slice(&data[..accepted]);
        }
        file.pos += accepted;
        Ok(accepted)
    }

    fn close(&mut self, _file: RamFile) -> Result<(), BackendError> {
        self.open_handles = self.open_handles.saturating_sub(1);
        Ok(())
    }

    fn stat(&mut self, path: &str) -> Result<Option<EntryKind>, BackendError> {
        self.ensure_mounted()?;
        validate(path)?;
        Ok(self.kind_of(path))
    }

    fn remove(&mut self, path: &str) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        validate(path)?;
        match self.kind_of(path) {
            Some(EntryKind::File) => {
                self.nodes.remove(path);
                Ok(())
            }
            Some(EntryKind::Directory) => Err(BackendError::IsADirectory),
            None => Err(BackendError::NotFound),
        }
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        validate(from)?;
        validate(to)?;
        if from == "/" || to.starts_with(child_prefix(from).as_str()) {
            return Err(BackendError::InvalidPath);
        }
        let kind = self.kind_of(from).ok_or(BackendError::NotFound)?;
        self.require_parent_dir(to)?;
        if from == to {
            return Ok(());
        }

        match (kind, self.kind_of(to)) {
            (_, Some(EntryKind::Directory)) => return Err(BackendError::AlreadyExists),
            (EntryKind::Directory, Some(EntryKind::File)) => {
                return Err(BackendError::NotADirectory)
            }
            _ => {}
        }

        let from_prefix = child_prefix(from);
        let moved: Vec<String> = self
            .nodes
            .keys()
            .filter(|key| key.as_str() == from || key.starts_with(from_prefix.as_str()))
            .cloned()
            .collect();

        for key in moved {
            if let Some(node) = self.nodes.remove(&key) {
                let mut renamed = String::from(to);
                renamed.push_str(&key[from.len()..]);
                self.nodes.insert(renamed, node);
            }
        }
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        if !self.config.directories {
            return Err(BackendError::Unsupported);
        }
        validate(path)?;
        if self.kind_of(path).is_some() {
            return Err(BackendError::AlreadyExists);
        }
        self.require_parent_dir(path)?;
        if self.free_blocks() == 0 {
            return Err(BackendError::NoSpace);
        }
        self.nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        validate(path)?;
        if path == "/" {
            return Err(BackendError::InvalidPath);
        }
        match self.kind_of(path) {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(BackendError::NotADirectory),
            None => return Err(BackendError::NotFound),
        }
        if self.has_children(path) && !self.config.recursive_rmdir {
            return Err(BackendError::DirectoryNotEmpty);
        }
        self.remove_subtree(path);
        Ok(())
    }

    fn rmdir_is_recursive(&self) -> bool {
        self.config.recursive_rmdir
    }

    fn list_children(
        &mut self,
        path: &str,
        visitor: &mut dyn FnMut(&str, EntryKind),
    ) -> Result<(), BackendError> {
        self.ensure_mounted()?;
        validate(path)?;
        match self.kind_of(path) {
            Some(EntryKind::Directory) => {}
            Some(EntryKind::File) => return Err(BackendError::NotADirectory),
            None => return Err(BackendError::NotFound),
        }

        for (key, node) in &self.nodes {
            if parent_of(key) != path {
                continue;
            }
            let kind = match node {
                Node::File(_) => EntryKind::File,
                Node::Dir => EntryKind::Directory,
            };
            visitor(&key[child_prefix(path).len()..], kind);
        }
        Ok(())
    }

    fn capacity(&mut self) -> Result<Capacity, BackendError> {
        self.ensure_mounted()?;
        let block_size = self.config.block_size;
        let block_count = self.config.block_count;
        let used_blocks = self.used_blocks();
        Ok(match self.config.accounting {
            Accounting::Bytes => Capacity::Bytes {
                total: block_size * block_count,
                used: block_size * used_blocks,
            },
            Accounting::Blocks => Capacity::Blocks {
                block_size,
                block_count,
                used_blocks,
            },
        })
    }
}

fn validate(path: &str) -> Result<(), BackendError> {
    if !path.starts_with('/') {
        return Err(BackendError::InvalidPath);
    }
    if path.len() > 1 && (path.ends_with('/') || path.contains("//")) {
        return Err(BackendError::InvalidPath);
    }
    Ok(())
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn child_prefix(path: &str) -> String {
    let mut prefix = String::from(path);
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn mounted(config: RamConfig) -> RamFilesystem {
        let mut fs = RamFilesystem::new(config);
        fs.mount().unwrap();
        fs
    }

    fn write(fs: &mut RamFilesystem, path: &str, data: &[u8]) -> usize {
        let mut file = fs.open(path, OpenMode::WriteTruncate).unwrap();
        let n = fs.write(&mut file, data).unwrap();
        fs.close(file).unwrap();
        n
    }

    fn names(fs: &mut RamFilesystem, path: &str) -> Vec<(String, EntryKind)> {
        let mut out = Vec::new();
        fs.list_children(path, &mut |name, kind| out.push((name.to_string(), kind)))
            .unwrap();
        out
    }

    #[test]
    fn test_operations_require_mount() {
        let mut fs = RamFilesystem::default();
        assert_eq!(fs.stat("/a").err(), Some(BackendError::NotMounted));
        assert_eq!(
            fs.open("/a", OpenMode::WriteTruncate).err(),
            Some(BackendError::NotMounted)
        );
    }

    #[test]
    fn test_write_then_read() {
        let mut fs = mounted(RamConfig::block_fs());
        assert_eq!(write(&mut fs, "/id", &[1, 2, 3]), 3);

        let mut file = fs.open("/id", OpenMode::Read).unwrap();
        assert_eq!(fs.file_len(&file).unwrap(), 3);
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(&mut file, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        fs.close(file).unwrap();
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_write_truncate_discards_previous_content() {
        let mut fs = mounted(RamConfig::block_fs());
        write(&mut fs, "/f", b"longer content");
        write(&mut fs, "/f", b"short");

        let file = fs.open("/f", OpenMode::Read).unwrap();
        assert_eq!(fs.file_len(&file).unwrap(), 5);
        fs.close(file).unwrap();
    }

    #[test]
    fn test_write_limit_truncates_silently() {
        let mut fs = mounted(RamConfig::block_fs());
        fs.faults_mut().write_limit = Some(2);
        assert_eq!(write(&mut fs, "/test", b"test"), 2);
    }

    #[test]
    fn test_format_heals_write_limit() {
        let mut fs = mounted(RamConfig::block_fs());
        fs.faults_mut().write_limit = Some(2);
        write(&mut fs, "/a", b"abcd");

        fs.format().unwrap();
        assert_eq!(fs.format_count(), 1);
        assert_eq!(fs.stat("/a").unwrap(), None);
        assert_eq!(write(&mut fs, "/a", b"abcd"), 4);
    }

    #[test]
    fn test_failed_format_keeps_data() {
        let mut fs = mounted(RamConfig::block_fs());
        write(&mut fs, "/a", b"x");
        fs.faults_mut().fail_format = true;
        assert_eq!(fs.format().err(), Some(BackendError::Io));
        assert_eq!(fs.stat("/a").unwrap(), Some(EntryKind::File));
        assert_eq!(fs.format_count(), 0);
    }

    #[test]
    fn test_running_out_of_blocks_is_partial_write() {
        let mut fs = mounted(RamConfig::block_fs().with_block_count(2));
        write(&mut fs, "/a", b"x");
        let data = vec![0xAAu8; 8192];
        // One block left for the second file
        assert_eq!(write(&mut fs, "/b", &data), 4096);
    }

    #[test]
    fn test_listing_is_immediate_children_only() {
        let mut fs = mounted(RamConfig::block_fs());
        fs.mkdir("/dir").unwrap();
        fs.mkdir("/dir/sub").unwrap();
        write(&mut fs, "/dir/file", b"1");
        write(&mut fs, "/dir/sub/deep", b"2");
        write(&mut fs, "/dirty", b"3");

        let listed = names(&mut fs, "/dir");
        assert_eq!(
            listed,
            vec![
                ("file".to_string(), EntryKind::File),
                ("sub".to_string(), EntryKind::Directory),
            ]
        );
    }

    #[test]
    fn test_non_recursive_rmdir() {
        let mut fs = mounted(RamConfig::block_fs());
        fs.mkdir("/dir").unwrap();
        write(&mut fs, "/dir/file", b"1");
        assert_eq!(fs.rmdir("/dir").err(), Some(BackendError::DirectoryNotEmpty));
        fs.remove("/dir/file").unwrap();
        fs.rmdir("/dir").unwrap();
        assert_eq!(fs.stat("/dir").unwrap(), None);
    }

    #[test]
    fn test_recursive_rmdir() {
        let mut fs = mounted(RamConfig::internal_fs());
        fs.mkdir("/dir").unwrap();
        fs.mkdir("/dir/sub").unwrap();
        write(&mut fs, "/dir/sub/file", b"1");
        write(&mut fs, "/dirty", b"keep");
        fs.rmdir("/dir").unwrap();
        assert_eq!(fs.stat("/dir/sub/file").unwrap(), None);
        assert_eq!(fs.stat("/dirty").unwrap(), Some(EntryKind::File));
    }

    #[test]
    fn test_flat_namespace_rejects_mkdir() {
        let mut fs = mounted(RamConfig::alt_fs());
        assert_eq!(fs.mkdir("/dir").err(), Some(BackendError::Unsupported));
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut fs = mounted(RamConfig::block_fs());
        fs.mkdir("/old").unwrap();
        write(&mut fs, "/old/a", b"a");
        fs.rename("/old", "/new").unwrap();
        assert_eq!(fs.stat("/new/a").unwrap(), Some(EntryKind::File));
        assert_eq!(fs.stat("/old").unwrap(), None);
    }

    #[test]
    fn test_rename_missing_source() {
        let mut fs = mounted(RamConfig::block_fs());
        assert_eq!(fs.rename("/nope", "/x").err(), Some(BackendError::NotFound));
    }

    #[test]
    fn test_block_accounting() {
        let mut fs = mounted(RamConfig::internal_fs());
        write(&mut fs, "/a", &[0u8; 5000]);
        assert_eq!(
            fs.capacity().unwrap(),
            Capacity::Blocks {
                block_size: 4096,
                block_count: 7,
                used_blocks: 2,
            }
        );
    }

    #[test]
    fn test_invalid_paths() {
        let mut fs = mounted(RamConfig::block_fs());
        assert_eq!(fs.stat("relative").err(), Some(BackendError::InvalidPath));
        assert_eq!(fs.stat("/trailing/").err(), Some(BackendError::InvalidPath));
        assert_eq!(fs.stat("/a//b").err(), Some(BackendError::InvalidPath));
    }
}
