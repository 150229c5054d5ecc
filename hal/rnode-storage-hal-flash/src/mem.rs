//! NOR flash in RAM
//!
//! Host stand-in for the RP2040 XIP flash: erase sets bytes to 0xFF and
//! writes can only clear bits. Faults can be armed to model worn flash.

use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use embedded_storage_async::nor_flash::{
    ErrorType, MultiwriteNorFlash, NorFlash, NorFlashErrorKind, ReadNorFlash,
};

/// Erase block size
pub const MEM_PAGE_SIZE: usize = 4096;

/// In-memory NOR flash
#[derive(Debug, Clone)]
pub struct MemFlash {
    data: Vec<u8>,
    fail_writes: bool,
    fail_erase: bool,
    erase_count: usize,
}

impl MemFlash {
    /// Erased flash of `pages` erase blocks
    pub fn new(pages: usize) -> Self {
        Self {
            data: vec![0xFF; MEM_PAGE_SIZE * pages],
            fail_writes: false,
            fail_erase: false,
            erase_count: 0,
        }
    }

    /// The whole device as a partition range
    pub fn range(&self) -> Range<u32> {
        0..self.data.len() as u32
    }

    /// Reject every write until the whole device is erased in one call
    ///
    /// Erasing single pages, as garbage collection does, leaves the fault
    /// armed.
    pub fn fail_writes_until_format(&mut self) {
        self.fail_writes = true;
    }

    /// Reject every erase
    pub fn set_fail_erase(&mut self, fail: bool) {
        self.fail_erase = fail;
    }

    /// Number of whole-device erases
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }
}

impl ErrorType for MemFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MemFlash {
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        bytes.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MemFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = MEM_PAGE_SIZE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let (from, to) = (from as usize, to as usize);
        if from % MEM_PAGE_SIZE != 0 || to % MEM_PAGE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if to > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        if self.fail_erase {
            return Err(NorFlashErrorKind::Other);
        }
        self.data[from..to].fill(0xFF);
        if from == 0 && to == self.data.len() {
            self.fail_writes = false;
            self.erase_count += 1;
        }
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        if start % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if start + bytes.len() > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        if self.fail_writes {
            return Err(NorFlashErrorKind::Other);
        }
        for (cell, byte) in self.data[start..].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

impl MultiwriteNorFlash for MemFlash {}
