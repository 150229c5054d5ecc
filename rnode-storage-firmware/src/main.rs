//! RNode storage bring-up firmware
//!
//! Owns the process-wide storage handle: mounts the compiled-in back end,
//! probes it for writability, repairs it with a preserving reformat when
//! needed, and reports the result. A failed recovery format is a hardware
//! fault and parks the board in a distinct blink pattern instead of
//! retrying.

#![no_std]
#![no_main]

extern crate alloc;

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::gpio::{Level, Output};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Timer;
use embedded_alloc::LlffHeap as Heap;
use {defmt_rtt as _, panic_probe as _};

use rnode_storage_core::config::{PreservedFileSet, StorageConfig};
use rnode_storage_core::{initialize, BootError, ProbeOutcome, StorageHandle};

mod backend;

mod storage_config {
    include!(concat!(env!("OUT_DIR"), "/storage_config.rs"));
}

// Heap allocator for file buffers and directory listings
#[global_allocator]
static HEAP: Heap = Heap::empty();

// Heap size: 32KB
const HEAP_SIZE: usize = 32 * 1024;

/// Storage configuration from storage.toml
const STORAGE_CONFIG: StorageConfig = StorageConfig::new(
    storage_config::CANARY_PATH,
    storage_config::CANARY_PAYLOAD,
    PreservedFileSet::new(storage_config::PRESERVED),
);

/// The mounted filesystem, installed once by `initialize`
static STORAGE: StorageHandle<CriticalSectionRawMutex, backend::Backend> = StorageHandle::new();

/// Main entry point
#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("RNode storage firmware starting...");

    init_heap();

    let p = embassy_rp::init(Default::default());
    let mut led = Output::new(p.PIN_25, Level::Low);

    let fs = backend::create(p.FLASH, p.DMA_CH0);
    match initialize(&STORAGE, fs, &STORAGE_CONFIG) {
        Ok(report) => {
            match report.outcome {
                ProbeOutcome::Verified => info!("Storage verified"),
                ProbeOutcome::Reformatted(ref r) => warn!(
                    "Storage reformatted: {} restored, {} missing, {} lost",
                    r.restored.len(),
                    r.missing.len(),
                    r.lost.len()
                ),
            }
            info!(
                "Storage: {} bytes total, {} available",
                report.total_bytes, report.available_bytes
            );
        }
        Err(e) if e.is_hardware_failure() => {
            error!("Flash cannot hold data: {:?}", e);
            hardware_fault(&mut led).await;
        }
        Err(e) => {
            error!("Storage unavailable: {:?}", e);
            degraded(&mut led, e).await;
        }
    }

    led.set_high();
    loop {
        Timer::after_secs(60).await;
        match STORAGE.with(|fs| fs.storage_available()) {
            Ok(free) => debug!("Storage: {} bytes available", free),
            Err(e) => warn!("Storage busy: {:?}", e),
        }
    }
}

/// Fast blink forever; the flash is unusable
async fn hardware_fault(led: &mut Output<'_>) -> ! {
    loop {
        led.toggle();
        Timer::after_millis(100).await;
    }
}

/// Slow blink forever; storage is missing but the board is not at fault
async fn degraded(led: &mut Output<'_>, error: BootError) -> ! {
    loop {
        led.toggle();
        Timer::after_millis(1000).await;
        trace!("storage error: {:?}", error);
    }
}

/// Initialize the heap allocator
fn init_heap() {
    use core::mem::MaybeUninit;
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    #[allow(static_mut_refs)]
    unsafe {
        HEAP.init(HEAP_MEM.as_ptr() as usize, HEAP_SIZE)
    }
}
