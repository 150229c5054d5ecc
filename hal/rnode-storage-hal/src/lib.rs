//! RNode storage hardware abstraction layer
//!
//! This crate defines the primitive capability set every flash filesystem
//! back end exposes to the storage core. Exactly one back end is compiled
//! into a given firmware image; the core is generic over it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  rnode-storage-core (Storage<B>)        │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  rnode-storage-hal (this crate - traits)│
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┼───────────┐
//!         ▼           ▼           ▼
//! ┌─────────────┐ ┌─────────┐ ┌──────────────┐
//! │ hal-flash   │ │ hal-ram │ │ NoopFilesystem│
//! └─────────────┘ └─────────┘ └──────────────┘
//! ```
//!
//! # Traits
//!
//! - [`fs::FlashFilesystem`] - open/read/write/close, namespace operations,
//!   capacity accounting and the destructive low-level format

#![no_std]
#![deny(unsafe_code)]

pub mod fs;
pub mod noop;

// Re-export key types at crate root for convenience
pub use fs::{BackendError, Capacity, EntryKind, FlashFilesystem, OpenMode};
pub use noop::NoopFilesystem;
