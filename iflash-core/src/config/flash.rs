//! Flash configuration
//!
//! Describes the physical flash of the part, the window callers may
//! access, and the driver policies. Validated once when the driver is
//! created.

use iflash_hal::BankId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geometry::{is_aligned, Bank, BankLayout};

/// Errors in a flash configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Page size is zero
    ZeroPageSize,
    /// Flash or user region has zero size
    EmptyRegion,
    /// Flash size or bank boundary is not a multiple of the page size
    BankNotPageAligned,
    /// Banks are out of order, overlap, or bank 2 lies outside flash
    BanksOverlap,
    /// Both banks of a dual-bank layout have the same id
    DuplicateBankId,
    /// User region is not entirely inside physical flash
    RegionOutsideFlash,
    /// User region does not start and end on page boundaries
    RegionNotPageAligned,
    /// Flash or user region extends past the 32-bit address space
    RegionOverflow,
    /// Controller program unit is zero or larger than the driver supports
    UnsupportedProgramUnit,
    /// Requested erase size does not match the configured page size
    PageSizeMismatch,
}

/// The caller-visible flash window
///
/// Everything outside it (bootloader, vendor reserved pages, ...) is never
/// touched by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlashRegion {
    /// First accessible address
    pub start_address: u32,
    /// Size of the window in bytes
    pub size_bytes: u32,
}

impl FlashRegion {
    /// Create a region
    pub const fn new(start_address: u32, size_bytes: u32) -> Self {
        Self {
            start_address,
            size_bytes,
        }
    }

    /// First address past the end of the region
    pub const fn end_address(&self) -> u64 {
        self.start_address as u64 + self.size_bytes as u64
    }
}

/// Flash driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlashConfig {
    /// Physical erase granularity in bytes
    pub page_size_bytes: u32,
    /// Start of the controller address space (start of bank 1)
    pub flash_base: u32,
    /// Total flash size in bytes, all banks
    pub flash_size_bytes: u32,
    /// Window the driver may read, write and erase
    pub region: FlashRegion,
    /// Treat the flash as two independently erasable banks
    pub dual_bank_mode: bool,
    /// Start of bank 2 (ignored in single-bank mode)
    pub bank2_base: u32,
    /// Panic on internal invariant violations instead of returning an error
    pub assertions_enabled: bool,
    /// Lock the controller after every write or erase instead of keeping it
    /// unlocked between `init` and `deinit`
    pub relock_after_operation: bool,
    /// Read back every programmed unit and compare
    pub verify_writes: bool,
}

impl FlashConfig {
    /// Configuration for a single-bank part
    pub const fn single_bank(
        flash_base: u32,
        flash_size_bytes: u32,
        page_size_bytes: u32,
        region: FlashRegion,
    ) -> Self {
        Self {
            page_size_bytes,
            flash_base,
            flash_size_bytes,
            region,
            dual_bank_mode: false,
            bank2_base: 0,
            assertions_enabled: cfg!(debug_assertions),
            relock_after_operation: false,
            verify_writes: false,
        }
    }

    /// Configuration for a dual-bank part, bank 2 starting at `bank2_base`
    pub const fn dual_bank(
        flash_base: u32,
        flash_size_bytes: u32,
        page_size_bytes: u32,
        bank2_base: u32,
        region: FlashRegion,
    ) -> Self {
        Self {
            dual_bank_mode: true,
            bank2_base,
            ..Self::single_bank(flash_base, flash_size_bytes, page_size_bytes, region)
        }
    }

    /// Set whether invariant violations panic
    pub const fn with_assertions(mut self, enabled: bool) -> Self {
        self.assertions_enabled = enabled;
        self
    }

    /// Set whether the controller is relocked after every operation
    pub const fn with_relock(mut self, enabled: bool) -> Self {
        self.relock_after_operation = enabled;
        self
    }

    /// Set whether written data is read back and compared
    pub const fn with_verify(mut self, enabled: bool) -> Self {
        self.verify_writes = enabled;
        self
    }

    /// First address past the end of physical flash
    pub const fn flash_end(&self) -> u64 {
        self.flash_base as u64 + self.flash_size_bytes as u64
    }

    /// Derive the bank layout from the flash geometry
    pub fn layout(&self) -> Result<BankLayout, ConfigError> {
        let page = self.page_size_bytes;
        if page == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.flash_size_bytes == 0 {
            return Err(ConfigError::EmptyRegion);
        }
        if self.flash_end() > 1 << 32 {
            return Err(ConfigError::RegionOverflow);
        }
        if !is_aligned(self.flash_size_bytes, page) {
            return Err(ConfigError::BankNotPageAligned);
        }

        if !self.dual_bank_mode {
            let pages = self.flash_size_bytes / page;
            return Ok(BankLayout::single(Bank::new(
                BankId::Bank1,
                self.flash_base,
                pages,
                page,
            )));
        }

        if self.bank2_base <= self.flash_base || u64::from(self.bank2_base) >= self.flash_end() {
            return Err(ConfigError::BanksOverlap);
        }

        let bank1_size = self.bank2_base - self.flash_base;
        if !is_aligned(bank1_size, page) {
            return Err(ConfigError::BankNotPageAligned);
        }
        let bank2_size = self.flash_size_bytes - bank1_size;

        BankLayout::dual(
            Bank::new(BankId::Bank1, self.flash_base, bank1_size / page, page),
            Bank::new(BankId::Bank2, self.bank2_base, bank2_size / page, page),
        )
    }

    /// Check the whole configuration and derive the bank layout
    ///
    /// Besides the geometry checks of [`Self::layout`], the user region must
    /// be non-empty, lie entirely inside physical flash and cover whole
    /// pages. Erases work on whole pages, so a region boundary inside a page
    /// would let an erase reach bytes outside the region.
    pub fn validate(&self) -> Result<BankLayout, ConfigError> {
        let layout = self.layout()?;

        if self.region.size_bytes == 0 {
            return Err(ConfigError::EmptyRegion);
        }
        if self.region.end_address() > 1 << 32 {
            return Err(ConfigError::RegionOverflow);
        }
        if self.region.start_address < layout.start_address()
            || self.region.end_address() > layout.end_address()
        {
            return Err(ConfigError::RegionOutsideFlash);
        }

        // Pages are counted from the flash base, bank 2 starts on a page
        let offset = self.region.start_address - self.flash_base;
        if !is_aligned(offset, self.page_size_bytes)
            || !is_aligned(self.region.size_bytes, self.page_size_bytes)
        {
            return Err(ConfigError::RegionNotPageAligned);
        }

        Ok(layout)
    }
}
