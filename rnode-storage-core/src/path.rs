//! File paths
//!
//! Absolute, slash-delimited, bounded in length so they can live without
//! the heap.

use core::fmt;

use heapless::String;

/// Longest accepted path in bytes
pub const MAX_PATH_LEN: usize = 128;

/// Path validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PathError {
    /// Empty string
    Empty,
    /// Missing leading separator
    Relative,
    /// Longer than [`MAX_PATH_LEN`]
    TooLong,
    /// Empty component (`//` or trailing `/`)
    EmptySegment,
}

/// Validated absolute path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilePath(String<MAX_PATH_LEN>);

impl FilePath {
    /// Validate and copy a path
    pub fn new(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if !path.starts_with('/') {
            return Err(PathError::Relative);
        }
        if path.len() > 1 && (path.ends_with('/') || path.contains("//")) {
            return Err(PathError::EmptySegment);
        }
        let mut out = String::new();
        out.push_str(path).map_err(|_| PathError::TooLong)?;
        Ok(Self(out))
    }

    /// The root directory `/`
    pub fn root() -> Self {
        let mut out = String::new();
        // Capacity is far above one byte
        let _ = out.push('/');
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_root(&self) -> bool {
        self.as_str() == "/"
    }

    /// Append a single entry name
    pub fn join(&self, name: &str) -> Result<Self, PathError> {
        if name.is_empty() || name.contains('/') {
            return Err(PathError::EmptySegment);
        }
        let mut out = self.0.clone();
        if !self.is_root() {
            out.push('/').map_err(|_| PathError::TooLong)?;
        }
        out.push_str(name).map_err(|_| PathError::TooLong)?;
        Ok(Self(out))
    }

    /// Last component, empty for the root
    pub fn file_name(&self) -> &str {
        match self.as_str().rfind('/') {
            Some(idx) => &self.as_str()[idx + 1..],
            None => self.as_str(),
        }
    }
}

impl AsRef<str> for FilePath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FilePath {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}
