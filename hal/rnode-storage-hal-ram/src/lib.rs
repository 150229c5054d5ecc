//! RAM-resident flash filesystem
//!
//! A hierarchical filesystem kept entirely in memory, used for host-side
//! simulation and as a test double for the storage core. Presets reproduce
//! the observable differences between the supported flash engines:
//!
//! - [`RamConfig::block_fs`] - wear-levelled block filesystem: byte counters,
//!   non-recursive `rmdir`
//! - [`RamConfig::alt_fs`] - alternative flash filesystem: flat namespace
//!   without directories, byte counters
//! - [`RamConfig::internal_fs`] - internal-flash variant: block traversal
//!   accounting, recursive `rmdir`
//!
//! [`Faults`] injects the failure modes the boot-time probe has to catch.

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

mod faults;
mod filesystem;

pub use faults::Faults;
pub use filesystem::{Accounting, RamConfig, RamFile, RamFilesystem};
