//! Board-agnostic storage layer for the RNode firmware
//!
//! This crate contains all storage logic that does not depend on a specific
//! flash filesystem engine:
//!
//! - Uniform file and directory operations over one back end
//! - Process-wide storage handle with init-once lifecycle
//! - Boot-time writability probe
//! - Selective preserve-and-reformat recovery
//! - Storage configuration and path validation
//! - Debug tree walkers

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

// Must come first so the logging macros are visible to every module
mod fmt;

pub mod boot;
pub mod config;
pub mod debug;
pub mod error;
pub mod handle;
pub mod path;
pub mod reformat;
pub mod storage;

pub use boot::{initialize, probe, BootReport, ProbeOutcome};
pub use config::{PreservedFileSet, StorageConfig};
pub use error::{BootError, StorageError};
pub use handle::StorageHandle;
pub use path::FilePath;
pub use reformat::{ReformatReport, ReformatState, SafeReformat};
pub use storage::Storage;

/// Caller-owned byte sequence used for reads and writes
pub type ByteBuffer = alloc::vec::Vec<u8>;
