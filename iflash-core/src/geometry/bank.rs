//! Bank layout
//!
//! Describes the flash banks of a part and maps addresses and byte ranges
//! onto them. Single- and dual-bank parts are the same type, selected at
//! runtime from configuration.

use heapless::Vec;
use iflash_hal::BankId;

use crate::config::ConfigError;
use crate::error::FlashError;

/// Maximum number of banks a layout can describe
pub const MAX_BANKS: usize = 2;

/// One independently erasable flash bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bank {
    /// Bank identifier passed to the controller
    pub id: BankId,
    /// Address of the first byte of the bank
    pub base_address: u32,
    /// Number of erase pages in the bank
    pub total_pages: u32,
    /// Erase page size in bytes
    pub page_size_bytes: u32,
}

impl Bank {
    /// Create a bank description
    pub const fn new(
        id: BankId,
        base_address: u32,
        total_pages: u32,
        page_size_bytes: u32,
    ) -> Self {
        Self {
            id,
            base_address,
            total_pages,
            page_size_bytes,
        }
    }

    /// Bank size in bytes
    ///
    /// `u64` because a bank may end exactly at the top of the address space.
    pub const fn size_bytes(&self) -> u64 {
        self.total_pages as u64 * self.page_size_bytes as u64
    }

    /// First address past the end of the bank
    pub const fn end_address(&self) -> u64 {
        self.base_address as u64 + self.size_bytes()
    }

    /// Check if `addr` lies inside this bank
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base_address && (addr as u64) < self.end_address()
    }
}

/// The part of a byte range that falls into one bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubRange {
    /// Bank the bytes belong to
    pub bank: Bank,
    /// First byte of the sub-range
    pub address: u32,
    /// Number of bytes
    pub size: u32,
}

/// Bank configuration of the flash controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BankLayout {
    /// One bank covering the whole controller address space
    Single(Bank),
    /// Two banks, ordered by base address
    Dual(Bank, Bank),
}

impl BankLayout {
    /// Create a single-bank layout
    pub const fn single(bank: Bank) -> Self {
        BankLayout::Single(bank)
    }

    /// Create a dual-bank layout
    ///
    /// The banks must be ordered by base address and must not overlap.
    pub fn dual(bank1: Bank, bank2: Bank) -> Result<Self, ConfigError> {
        if bank1.id == bank2.id {
            return Err(ConfigError::DuplicateBankId);
        }
        if bank1.end_address() > u64::from(bank2.base_address) {
            return Err(ConfigError::BanksOverlap);
        }
        Ok(BankLayout::Dual(bank1, bank2))
    }

    /// Iterate over the banks in address order
    pub fn banks(&self) -> impl Iterator<Item = &Bank> {
        let (first, second) = match self {
            BankLayout::Single(bank) => (bank, None),
            BankLayout::Dual(bank1, bank2) => (bank1, Some(bank2)),
        };
        core::iter::once(first).chain(second)
    }

    /// Find a bank by id
    pub fn bank(&self, id: BankId) -> Option<&Bank> {
        self.banks().find(|b| b.id == id)
    }

    /// Check if this is a dual-bank layout
    pub fn is_dual_bank(&self) -> bool {
        matches!(self, BankLayout::Dual(..))
    }

    /// Address of the first byte of the first bank
    pub fn start_address(&self) -> u32 {
        match self {
            BankLayout::Single(bank) | BankLayout::Dual(bank, _) => bank.base_address,
        }
    }

    /// First address past the end of the last bank
    pub fn end_address(&self) -> u64 {
        match self {
            BankLayout::Single(bank) | BankLayout::Dual(_, bank) => bank.end_address(),
        }
    }

    /// Get the bank whose address range contains `addr`
    pub fn bank_containing(&self, addr: u32) -> Result<&Bank, FlashError> {
        self.banks()
            .find(|b| b.contains(addr))
            .ok_or(FlashError::AddressOutOfRange)
    }

    /// Split `[addr, addr + size)` into per-bank sub-ranges, in byte order
    ///
    /// A single-bank layout always yields the input range unchanged; checking
    /// it against the bank size is left to the erase assembler. In a
    /// dual-bank layout a range that straddles the start of bank 2 is cut
    /// there; a range running past the end of bank 2 would need a third
    /// bank and fails with [`FlashError::UnsupportedSpan`].
    pub fn split_range_by_bank(
        &self,
        addr: u32,
        size: u32,
    ) -> Result<Vec<SubRange, MAX_BANKS>, FlashError> {
        if size == 0 {
            return Err(FlashError::InvalidArgument);
        }

        let mut ranges = Vec::new();
        let end = u64::from(addr) + u64::from(size);

        match *self {
            BankLayout::Single(bank) => {
                ranges
                    .push(SubRange {
                        bank,
                        address: addr,
                        size,
                    })
                    .map_err(|_| FlashError::UnsupportedSpan)?;
            }
            BankLayout::Dual(bank1, bank2) => {
                let split = bank2.base_address;

                if addr >= split {
                    if !bank2.contains(addr) {
                        return Err(FlashError::AddressOutOfRange);
                    }
                    if end > bank2.end_address() {
                        return Err(FlashError::UnsupportedSpan);
                    }
                    ranges
                        .push(SubRange {
                            bank: bank2,
                            address: addr,
                            size,
                        })
                        .map_err(|_| FlashError::UnsupportedSpan)?;
                } else {
                    if !bank1.contains(addr) {
                        return Err(FlashError::AddressOutOfRange);
                    }

                    if end <= u64::from(split) {
                        ranges
                            .push(SubRange {
                                bank: bank1,
                                address: addr,
                                size,
                            })
                            .map_err(|_| FlashError::UnsupportedSpan)?;
                    } else {
                        if end > bank2.end_address() {
                            return Err(FlashError::UnsupportedSpan);
                        }

                        let head = split - addr;
                        ranges
                            .push(SubRange {
                                bank: bank1,
                                address: addr,
                                size: head,
                            })
                            .map_err(|_| FlashError::UnsupportedSpan)?;
                        ranges
                            .push(SubRange {
                                bank: bank2,
                                address: split,
                                size: size - head,
                            })
                            .map_err(|_| FlashError::UnsupportedSpan)?;
                    }
                }
            }
        }

        Ok(ranges)
    }
}
