//! Selective preserve-and-reformat
//!
//! A low-level format is the only dependable repair for inconsistent
//! filesystem metadata, but it would also erase the device identity. The
//! procedure brackets the format with a snapshot and restore of the
//! preserved files:
//!
//! ```text
//! Start -> Snapshot -> Format -> Restore -> Done
//!                        |
//!                        +-> Failed
//! ```
//!
//! Only a failed format fails the procedure. Files that cannot be
//! snapshotted or restored are logged and listed in the [`ReformatReport`].

use alloc::vec::Vec;

use rnode_storage_hal::{BackendError, FlashFilesystem};

use crate::config::PreservedFileSet;
use crate::error::StorageError;
use crate::path::FilePath;
use crate::storage::Storage;
use crate::ByteBuffer;

/// Reformat progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReformatState {
    Start,
    Snapshot,
    Format,
    Restore,
    Done,
    /// Format failed, the filesystem cannot be trusted
    Failed(BackendError),
}

impl ReformatState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReformatState::Done | ReformatState::Failed(_))
    }
}

/// Outcome for each preserved path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReformatReport {
    /// Written back after the format
    pub restored: Vec<FilePath>,
    /// Absent or empty before the format, nothing to restore
    pub missing: Vec<FilePath>,
    /// Present before the format but not restored
    pub lost: Vec<FilePath>,
}

impl ReformatReport {
    /// Every preserved file that existed survived
    pub fn is_complete(&self) -> bool {
        self.lost.is_empty()
    }
}

/// Reformat state machine over mounted storage
pub struct SafeReformat<'a, B: FlashFilesystem> {
    storage: &'a mut Storage<B>,
    preserved: PreservedFileSet,
    state: ReformatState,
    snapshot: Vec<(FilePath, ByteBuffer)>,
    report: ReformatReport,
}

impl<'a, B: FlashFilesystem> SafeReformat<'a, B> {
    pub fn new(storage: &'a mut Storage<B>, preserved: PreservedFileSet) -> Self {
        Self {
            storage,
            preserved,
            state: ReformatState::Start,
            snapshot: Vec::new(),
            report: ReformatReport::default(),
        }
    }

    pub fn state(&self) -> ReformatState {
        self.state
    }

    pub fn report(&self) -> &ReformatReport {
        &self.report
    }

    /// Advance by one state
    pub fn step(&mut self) -> ReformatState {
        self.state = match self.state {
            ReformatState::Start => {
                warn!(
                    "starting safe reformat, preserving {} paths",
                    self.preserved.len()
                );
                ReformatState::Snapshot
            }
            ReformatState::Snapshot => {
                self.snapshot();
                ReformatState::Format
            }
            ReformatState::Format => match self.storage.backend_mut().format() {
                Ok(()) => {
                    info!("filesystem formatted");
                    ReformatState::Restore
                }
                Err(e) => {
                    critical!("filesystem format failed: {:?}", e);
                    ReformatState::Failed(e)
                }
            },
            ReformatState::Restore => {
                self.restore();
                info!(
                    "safe reformat done: {} restored, {} missing, {} lost",
                    self.report.restored.len(),
                    self.report.missing.len(),
                    self.report.lost.len()
                );
                ReformatState::Done
            }
            terminal => terminal,
        };
        self.state
    }

    /// Run to a terminal state
    pub fn run(mut self) -> Result<ReformatReport, StorageError> {
        while !self.state.is_terminal() {
            self.step();
        }
        match self.state {
            ReformatState::Failed(e) => Err(StorageError::Format(e)),
            _ => Ok(self.report),
        }
    }

    fn snapshot(&mut self) {
        for raw in self.preserved.iter() {
            let path = match FilePath::new(raw) {
                Ok(path) => path,
                Err(e) => {
                    error!("preserved path {} is invalid: {:?}", raw, e);
                    continue;
                }
            };
            if !self.storage.file_exists(path.as_str()) {
                debug!("preserved file {} not present", path);
                self.report.missing.push(path);
                continue;
            }
            match self.storage.try_read_file(path.as_str()) {
                Ok(data) if data.is_empty() => {
                    debug!("preserved file {} is empty, not restored", path);
                    self.report.missing.push(path);
                }
                Ok(data) => {
                    debug!("snapshot of {}: {} bytes", path, data.len());
                    self.snapshot.push((path, data));
                }
                Err(e) => {
                    error!("could not snapshot {}: {:?}", path, e);
                    self.report.lost.push(path);
                }
            }
        }
    }

    fn restore(&mut self) {
        for (path, data) in core::mem::take(&mut self.snapshot) {
            match self.storage.try_write_file(path.as_str(), &data) {
                Ok(_) => {
                    debug!("restored {}", path);
                    self.report.restored.push(path);
                }
                Err(e) => {
                    error!("could not restore {}: {:?}", path, e);
                    self.report.lost.push(path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};
    use alloc::vec;
    use proptest::prelude::*;
    use rnode_storage_hal_flash::{MemFlash, SequentialFilesystem};
    use rnode_storage_hal_ram::{RamConfig, RamFilesystem};

    const IDENTITY: PreservedFileSet = PreservedFileSet::identity();

    fn mounted() -> Storage<RamFilesystem> {
        Storage::mount(RamFilesystem::new(RamConfig::block_fs())).unwrap()
    }

    fn paths(list: &[FilePath]) -> Vec<&str> {
        list.iter().map(|p| p.as_str()).collect()
    }

    #[test]
    fn test_identity_survives_reformat() {
        let mut storage = mounted();
        storage.write_file("/eeprom", &[0xAB, 0xCD]);
        storage.write_file("/transport_identity", &[0x01, 0x02, 0x03]);
        storage.write_file("/scratch", b"temporary");

        let report = SafeReformat::new(&mut storage, IDENTITY).run().unwrap();

        assert_eq!(storage.read_file("/eeprom"), vec![0xAB, 0xCD]);
        assert_eq!(storage.read_file("/transport_identity"), vec![0x01, 0x02, 0x03]);
        assert!(!storage.file_exists("/scratch"));
        assert_eq!(paths(&report.restored), vec!["/eeprom", "/transport_identity"]);
        assert!(report.missing.is_empty());
        assert!(report.is_complete());
        assert_eq!(storage.backend().format_count(), 1);
    }

    #[test]
    fn test_no_preserved_files_present() {
        let mut storage = mounted();
        storage.write_file("/scratch", b"x");

        let report = SafeReformat::new(&mut storage, IDENTITY).run().unwrap();

        assert!(report.restored.is_empty());
        assert_eq!(paths(&report.missing), vec!["/eeprom", "/transport_identity"]);
        assert!(!storage.file_exists("/scratch"));
        assert_eq!(storage.backend().format_count(), 1);
    }

    #[test]
    fn test_empty_preserved_set() {
        let mut storage = mounted();
        let report = SafeReformat::new(&mut storage, PreservedFileSet::empty())
            .run()
            .unwrap();
        assert_eq!(report, ReformatReport::default());
    }

    #[test]
    fn test_state_sequence() {
        let mut storage = mounted();
        let mut reformat = SafeReformat::new(&mut storage, IDENTITY);
        assert_eq!(reformat.state(), ReformatState::Start);
        assert_eq!(reformat.step(), ReformatState::Snapshot);
        assert_eq!(reformat.step(), ReformatState::Format);
        assert_eq!(reformat.step(), ReformatState::Restore);
        assert_eq!(reformat.step(), ReformatState::Done);
        assert_eq!(reformat.step(), ReformatState::Done);
    }

    #[test]
    fn test_format_failure_is_fatal() {
        let mut storage = mounted();
        storage.write_file("/eeprom", &[1]);
        storage.backend_mut().faults_mut().fail_format = true;

        let mut reformat = SafeReformat::new(&mut storage, IDENTITY);
        while !reformat.state().is_terminal() {
            reformat.step();
        }
        assert_eq!(reformat.state(), ReformatState::Failed(BackendError::Io));
        assert!(reformat.report().restored.is_empty());

        let result = SafeReformat::new(&mut storage, IDENTITY).run();
        assert_eq!(result, Err(StorageError::Format(BackendError::Io)));
    }

    #[test]
    fn test_restore_failure_does_not_abort_others() {
        let mut storage = mounted();
        storage.write_file("/eeprom", &[0xAB]);
        storage.write_file("/transport_identity", &[0x01]);
        storage.backend_mut().faults_mut().fail_write_open = vec!["/eeprom".to_string()];

        let report = SafeReformat::new(&mut storage, IDENTITY).run().unwrap();

        assert_eq!(paths(&report.lost), vec!["/eeprom"]);
        assert_eq!(paths(&report.restored), vec!["/transport_identity"]);
        assert!(!report.is_complete());
        assert_eq!(storage.read_file("/transport_identity"), vec![0x01]);
        assert_eq!(storage.backend().open_handles(), 0);
    }

    #[test]
    fn test_unreadable_file_is_lost_not_truncated() {
        let mut storage = mounted();
        storage.write_file("/eeprom", &[1, 2, 3, 4]);
        storage.backend_mut().faults_mut().read_limit = Some(2);

        let report = SafeReformat::new(&mut storage, IDENTITY).run().unwrap();

        assert_eq!(paths(&report.lost), vec!["/eeprom"]);
        assert!(!storage.file_exists("/eeprom"));
    }

    #[test]
    fn test_empty_preserved_file_is_not_restored() {
        let mut storage = mounted();
        storage.write_file("/eeprom", &[]);
        storage.write_file("/transport_identity", &[0x01]);

        let report = SafeReformat::new(&mut storage, IDENTITY).run().unwrap();

        assert_eq!(paths(&report.missing), vec!["/eeprom"]);
        assert_eq!(paths(&report.restored), vec!["/transport_identity"]);
        assert!(report.is_complete());
        assert!(!storage.file_exists("/eeprom"));
    }

    #[test]
    fn test_identity_survives_reformat_on_flash() {
        let flash = MemFlash::new(8);
        let range = flash.range();
        let mut storage = Storage::mount(SequentialFilesystem::new(flash, range)).unwrap();
        storage.write_file("/eeprom", &[0xAB, 0xCD]);
        storage.write_file("/transport_identity", &[0x01, 0x02, 0x03]);
        storage.write_file("/scratch", b"temporary");
        storage.create_directory("/logs");

        let report = SafeReformat::new(&mut storage, IDENTITY).run().unwrap();

        assert_eq!(storage.read_file("/eeprom"), vec![0xAB, 0xCD]);
        assert_eq!(storage.read_file("/transport_identity"), vec![0x01, 0x02, 0x03]);
        assert!(!storage.file_exists("/scratch"));
        assert!(!storage.directory_exists("/logs"));
        assert_eq!(paths(&report.restored), vec!["/eeprom", "/transport_identity"]);
        assert_eq!(storage.backend_mut().flash().erase_count(), 1);
    }

    #[test]
    fn test_flash_erase_failure_keeps_files() {
        let flash = MemFlash::new(8);
        let range = flash.range();
        let mut storage = Storage::mount(SequentialFilesystem::new(flash, range)).unwrap();
        storage.write_file("/eeprom", &[1]);
        storage.backend_mut().flash().set_fail_erase(true);

        let result = SafeReformat::new(&mut storage, IDENTITY).run();

        assert_eq!(result, Err(StorageError::Format(BackendError::Io)));
        assert_eq!(storage.read_file("/eeprom"), vec![1]);
    }

    const SET: &[&str] = &["/a", "/b", "/c", "/d"];

    proptest! {
        #[test]
        fn test_subset_preserved(
            present in prop::collection::vec(any::<bool>(), SET.len()),
            contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), SET.len()),
            extras in prop::collection::vec("/x[a-z]{1,8}", 0..4),
        ) {
            let mut storage = mounted();
            for ((path, on), data) in SET.iter().zip(&present).zip(&contents) {
                if *on {
                    prop_assert_eq!(storage.write_file(path, data), data.len());
                }
            }
            for extra in &extras {
                storage.write_file(extra, b"junk");
            }

            let report = SafeReformat::new(&mut storage, PreservedFileSet::new(SET)).run().unwrap();

            let mut kept = 0;
            for ((path, on), data) in SET.iter().zip(&present).zip(&contents) {
                let survives = *on && !data.is_empty();
                prop_assert_eq!(storage.file_exists(path), survives);
                if survives {
                    prop_assert_eq!(&storage.read_file(path), data);
                    kept += 1;
                }
            }
            for extra in &extras {
                prop_assert!(!storage.file_exists(extra));
            }
            prop_assert!(report.is_complete());
            let restored: Vec<String> = report.restored.iter().map(|p| p.as_str().to_string()).collect();
            prop_assert_eq!(restored.len(), kept);
            prop_assert_eq!(report.missing.len(), SET.len() - kept);
        }
    }
}
