//! `embedded-storage` adapter
//!
//! Exposes the user region of a [`FlashDriver`] as a [`NorFlash`], so
//! storage crates built on that trait can sit on top of the driver.
//! Offsets are relative to the start of the region.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use iflash_hal::FlashController;

use crate::config::ConfigError;
use crate::driver::FlashDriver;
use crate::error::FlashError;
use crate::geometry::is_aligned;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlashError::OutOfRegion | FlashError::AddressOutOfRange => {
                NorFlashErrorKind::OutOfBounds
            }
            FlashError::InvalidArgument => NorFlashErrorKind::NotAligned,
            _ => NorFlashErrorKind::Other,
        }
    }
}

/// User region of a driver, as NOR flash
///
/// `PAGE_SIZE` is the erase size and must match the driver configuration.
/// The driver must be initialized before any access.
pub struct RegionStorage<'a, C, const PAGE_SIZE: usize> {
    driver: &'a mut FlashDriver<C>,
}

impl<'a, C: FlashController, const PAGE_SIZE: usize> RegionStorage<'a, C, PAGE_SIZE> {
    /// Wrap `driver`
    ///
    /// The driver only accepts regions made of whole pages, so with a
    /// matching `PAGE_SIZE` every page-aligned offset range up to
    /// [`capacity`](ReadNorFlash::capacity) is erasable.
    pub fn new(driver: &'a mut FlashDriver<C>) -> Result<Self, ConfigError> {
        if driver.config().page_size_bytes as usize != PAGE_SIZE {
            return Err(ConfigError::PageSizeMismatch);
        }

        Ok(Self { driver })
    }

    /// Get the wrapped driver
    pub fn driver(&mut self) -> &mut FlashDriver<C> {
        self.driver
    }

    fn address(&self, offset: u32) -> Result<u32, FlashError> {
        self.driver
            .region()
            .start_address
            .checked_add(offset)
            .ok_or(FlashError::OutOfRegion)
    }
}

impl<C: FlashController, const PAGE_SIZE: usize> ErrorType for RegionStorage<'_, C, PAGE_SIZE> {
    type Error = FlashError;
}

impl<C: FlashController, const PAGE_SIZE: usize> ReadNorFlash for RegionStorage<'_, C, PAGE_SIZE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        let address = self.address(offset)?;
        self.driver.read(address, bytes)
    }

    fn capacity(&self) -> usize {
        self.driver.region().size_bytes as usize
    }
}

impl<C: FlashController, const PAGE_SIZE: usize> NorFlash for RegionStorage<'_, C, PAGE_SIZE> {
    const WRITE_SIZE: usize = C::PROGRAM_UNIT_SIZE;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from > to {
            return Err(FlashError::OutOfRegion);
        }
        let page = PAGE_SIZE as u32;
        if !is_aligned(from, page) || !is_aligned(to, page) {
            return Err(FlashError::InvalidArgument);
        }
        if from == to {
            return Ok(());
        }

        let address = self.address(from)?;
        self.driver.erase(address, to - from)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        if !is_aligned(offset, Self::WRITE_SIZE as u32) || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(FlashError::InvalidArgument);
        }

        let address = self.address(offset)?;
        self.driver.write(address, bytes)
    }
}
