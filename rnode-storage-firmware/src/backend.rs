//! Compiled-in storage back end
//!
//! Exactly one of the `fs-*` features selects the back end for this image.

#[cfg(all(feature = "fs-flash", feature = "fs-noop"))]
compile_error!("features `fs-flash` and `fs-noop` are mutually exclusive");

#[cfg(not(any(feature = "fs-flash", feature = "fs-noop")))]
compile_error!("enable one storage back end feature: `fs-flash` or `fs-noop`");

#[cfg(feature = "fs-flash")]
mod imp {
    use embassy_rp::flash::{Async, Flash};
    use embassy_rp::peripherals::{DMA_CH0, FLASH};
    use embassy_rp::Peri;
    use rnode_storage_hal_flash::SequentialFilesystem;

    use crate::storage_config::PARTITION;

    /// 2MB flash on the Pico
    pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

    pub type Backend = SequentialFilesystem<Flash<'static, FLASH, Async, FLASH_SIZE>>;

    /// Filesystem over the partition reserved in storage.toml
    pub fn create(flash: Peri<'static, FLASH>, dma: Peri<'static, DMA_CH0>) -> Backend {
        SequentialFilesystem::new(Flash::new(flash, dma), PARTITION)
    }
}

#[cfg(feature = "fs-noop")]
mod imp {
    use embassy_rp::peripherals::{DMA_CH0, FLASH};
    use embassy_rp::Peri;
    use rnode_storage_hal::NoopFilesystem;

    pub type Backend = NoopFilesystem;

    /// Storage-less build, flash stays untouched
    pub fn create(_flash: Peri<'static, FLASH>, _dma: Peri<'static, DMA_CH0>) -> Backend {
        NoopFilesystem::new()
    }
}

pub use imp::{create, Backend};
