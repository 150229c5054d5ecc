//! Boot-time storage integrity check
//!
//! Every boot mounts the back end and writes a short canary. A mount that
//! succeeds but silently truncates writes (worn flash, corrupted metadata)
//! is caught here and repaired with a [`SafeReformat`]. Nothing about the
//! result is remembered between boots.

use embassy_sync::blocking_mutex::raw::RawMutex;
use rnode_storage_hal::FlashFilesystem;

use crate::config::StorageConfig;
use crate::error::BootError;
use crate::handle::StorageHandle;
use crate::reformat::{ReformatReport, SafeReformat};
use crate::storage::Storage;

/// Result of the writability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Canary written in full
    Verified,
    /// Canary was truncated and the filesystem was reformatted
    Reformatted(ReformatReport),
}

impl ProbeOutcome {
    pub fn reformatted(&self) -> bool {
        matches!(self, ProbeOutcome::Reformatted(_))
    }
}

/// Summary of a completed boot sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub outcome: ProbeOutcome,
    /// Total capacity in bytes after the probe
    pub total_bytes: usize,
    /// Free capacity in bytes after the probe
    pub available_bytes: usize,
}

/// Write the canary and reformat if it did not persist in full
pub fn probe<B: FlashFilesystem>(
    storage: &mut Storage<B>,
    config: &StorageConfig,
) -> Result<ProbeOutcome, BootError> {
    // A full entry table must not read as a failed write
    storage.reserve_path(config.canary_path);

    let expected = config.canary_payload.len();
    let written = storage.write_file(config.canary_path, config.canary_payload);

    if written < expected {
        critical!(
            "storage probe wrote {} of {} bytes, reformatting",
            written,
            expected
        );
        let report = SafeReformat::new(storage, config.preserved).run()?;
        if !report.is_complete() {
            error!("{} preserved files lost in reformat", report.lost.len());
        }
        return Ok(ProbeOutcome::Reformatted(report));
    }

    // Best effort, a leftover canary is overwritten next boot
    if !storage.remove_file(config.canary_path) {
        debug!("canary {} not removed", config.canary_path);
    }
    debug!("storage probe passed");
    Ok(ProbeOutcome::Verified)
}

/// Mount, probe and install storage into `handle`
///
/// Runs once per boot. A second call fails before the back end is touched.
pub fn initialize<M: RawMutex, B: FlashFilesystem>(
    handle: &StorageHandle<M, B>,
    backend: B,
    config: &StorageConfig,
) -> Result<BootReport, BootError> {
    config.validate()?;
    if let Some(limit) = backend.max_path_len() {
        config.check_path_limit(limit)?;
    }
    if handle.is_installed() {
        error!("storage already initialized");
        return Err(BootError::AlreadyInitialized);
    }

    let mut storage = Storage::mount(backend)?;

    let outcome = probe(&mut storage, config)?;
    let report = BootReport {
        outcome,
        total_bytes: storage.storage_size(),
        available_bytes: storage.storage_available(),
    };

    handle.install(storage)?;
    info!(
        "storage ready: {} of {} bytes free",
        report.available_bytes,
        report.total_bytes
    );
    Ok(report)
}
