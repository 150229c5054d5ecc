//! Fault injection

use alloc::string::String;
use alloc::vec::Vec;

/// Faults to inject into a [`RamFilesystem`](crate::RamFilesystem)
///
/// `write_limit` and `read_limit` model corrupted metadata and are cleared
/// by a successful format. The other faults model hardware and persist.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Mount fails
    pub fail_mount: bool,
    /// Format fails
    pub fail_format: bool,
    /// Files silently stop growing after this many bytes
    pub write_limit: Option<usize>,
    /// Reads stop after this many bytes of a file
    pub read_limit: Option<usize>,
    /// Paths that cannot be opened for writing
    pub fail_write_open: Vec<String>,
}

impl Faults {
    pub fn none() -> Self {
        Self::default()
    }

    /// Clear the faults a format repairs
    pub(crate) fn heal(&mut self) {
        self.write_limit = None;
        self.read_limit = None;
    }

    pub(crate) fn write_open_fails(&self, path: &str) -> bool {
        self.fail_write_open.iter().any(|p| p == path)
    }
}
