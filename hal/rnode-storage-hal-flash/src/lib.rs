//! Internal-flash filesystem back end
//!
//! Stores files as items of a `sequential-storage` map inside a NOR flash
//! partition, keyed by their path. Wear levelling and power-loss safety of
//! individual items come from `sequential-storage`; directory structure and
//! sizes are kept in catalog shard items (see [`catalog`]).
//!
//! Generic over any async [`MultiwriteNorFlash`](embedded_storage_async::nor_flash::MultiwriteNorFlash)
//! so the same back end runs against the RP2040 XIP flash on target and an
//! in-memory flash on the host. Flash futures are driven to completion with
//! `embassy_futures::block_on`; storage calls never yield.

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod fmt;

pub mod catalog;
pub mod filesystem;
#[cfg(any(test, feature = "mem-flash"))]
pub mod mem;

pub use catalog::{entry_limit, MAX_PATH_LEN};
pub use filesystem::{FlashFile, SequentialFilesystem, ITEM_BUFFER_SIZE, MAX_FILE_SIZE};
#[cfg(any(test, feature = "mem-flash"))]
pub use mem::{MemFlash, MEM_PAGE_SIZE};
