//! Storage configuration
//!
//! Which paths survive a reformat and how the boot probe writes its canary.
//! The preserved set is an explicit, reviewed list supplied by the identity
//! subsystems; it is never discovered at runtime.

use crate::path::{FilePath, PathError};

/// Device cryptographic identity
pub const EEPROM_PATH: &str = "/eeprom";

/// Network transport identity
pub const TRANSPORT_IDENTITY_PATH: &str = "/transport_identity";

/// Throwaway path written by the boot probe
pub const DEFAULT_CANARY_PATH: &str = "/test";

/// Canary content
pub const DEFAULT_CANARY_PAYLOAD: &[u8] = b"test";

/// Upper bound on preserved paths (all are held in RAM during a reformat)
pub const MAX_PRESERVED: usize = 8;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A configured path is malformed
    InvalidPath(PathError),
    /// Canary payload has no bytes, so it cannot detect truncation
    EmptyCanary,
    /// Canary path is listed as preserved
    CanaryPreserved,
    /// Same path listed twice
    DuplicatePreserved,
    /// More than [`MAX_PRESERVED`] paths
    TooManyPreserved,
    /// A configured path is longer than the back end can store
    PathTooLongForBackend,
}

impl From<PathError> for ConfigError {
    fn from(e: PathError) -> Self {
        ConfigError::InvalidPath(e)
    }
}

/// Paths whose content must survive a destructive reformat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreservedFileSet {
    paths: &'static [&'static str],
}

impl PreservedFileSet {
    pub const fn new(paths: &'static [&'static str]) -> Self {
        Self { paths }
    }

    /// Device identity and transport identity
    pub const fn identity() -> Self {
        Self::new(&[EEPROM_PATH, TRANSPORT_IDENTITY_PATH])
    }

    pub const fn empty() -> Self {
        Self::new(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.paths.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| *p == path)
    }
}

impl Default for PreservedFileSet {
    fn default() -> Self {
        Self::identity()
    }
}

/// Storage layer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// Path written and removed by the boot probe
    pub canary_path: &'static str,
    /// Bytes written to the canary path
    pub canary_payload: &'static [u8],
    /// Paths kept across a recovery format
    pub preserved: PreservedFileSet,
}

impl StorageConfig {
    pub const fn new(
        canary_path: &'static str,
        canary_payload: &'static [u8],
        preserved: PreservedFileSet,
    ) -> Self {
        Self {
            canary_path,
            canary_payload,
            preserved,
        }
    }

    /// Check the configuration before it is used at boot
    pub fn validate(&self) -> Result<(), ConfigError> {
        FilePath::new(self.canary_path)?;
        if self.canary_payload.is_empty() {
            return Err(ConfigError::EmptyCanary);
        }
        if self.preserved.len() > MAX_PRESERVED {
            return Err(ConfigError::TooManyPreserved);
        }
        for (idx, path) in self.preserved.iter().enumerate() {
            FilePath::new(path)?;
            if path == self.canary_path {
                return Err(ConfigError::CanaryPreserved);
            }
            if self.preserved.iter().skip(idx + 1).any(|other| other == path) {
                return Err(ConfigError::DuplicatePreserved);
            }
        }
        Ok(())
    }

    /// Check every configured path against a back end's path limit
    pub fn check_path_limit(&self, limit: usize) -> Result<(), ConfigError> {
        let too_long = core::iter::once(self.canary_path)
            .chain(self.preserved.iter())
            .find(|path| path.len() > limit);
        match too_long {
            Some(path) => {
                error!("configured path {} exceeds the back end limit of {} bytes", path, limit);
                Err(ConfigError::PathTooLongForBackend)
            }
            None => Ok(()),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_CANARY_PATH,
            DEFAULT_CANARY_PAYLOAD,
            PreservedFileSet::identity(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = StorageConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert!(config.preserved.contains("/eeprom"));
        assert!(config.preserved.contains("/transport_identity"));
        assert!(!config.preserved.contains("/time_offset"));
    }

    #[test]
    fn test_canary_must_not_be_preserved() {
        let config = StorageConfig::new(
            "/test",
            b"test",
            PreservedFileSet::new(&["/eeprom", "/test"]),
        );
        assert_eq!(config.validate(), Err(ConfigError::CanaryPreserved));
    }

    #[test]
    fn test_rejects_empty_canary() {
        let config = StorageConfig::new("/test", b"", PreservedFileSet::identity());
        assert_eq!(config.validate(), Err(ConfigError::EmptyCanary));
    }

    #[test]
    fn test_rejects_relative_and_duplicate_paths() {
        let relative = StorageConfig::new("/test", b"t", PreservedFileSet::new(&["eeprom"]));
        assert_eq!(
            relative.validate(),
            Err(ConfigError::InvalidPath(PathError::Relative))
        );

        let duplicate =
            StorageConfig::new("/test", b"t", PreservedFileSet::new(&["/eeprom", "/eeprom"]));
        assert_eq!(duplicate.validate(), Err(ConfigError::DuplicatePreserved));
    }

    #[test]
    fn test_path_limit_of_backend() {
        const LONG: &str = "/identity/transport/keys/primary/backup/with/a/long/name/that/overflows";
        let config = StorageConfig::new("/test", b"t", PreservedFileSet::new(&["/eeprom", LONG]));
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.check_path_limit(128), Ok(()));
        assert_eq!(
            config.check_path_limit(64),
            Err(ConfigError::PathTooLongForBackend)
        );
        assert_eq!(StorageConfig::default().check_path_limit(64), Ok(()));
    }

    #[test]
    fn test_rejects_oversized_set() {
        const MANY: &[&str] = &["/a", "/b", "/c", "/d", "/e", "/f", "/g", "/h", "/i"];
        let config = StorageConfig::new("/test", b"t", PreservedFileSet::new(MANY));
        assert_eq!(config.validate(), Err(ConfigError::TooManyPreserved));
    }
}
