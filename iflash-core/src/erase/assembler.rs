//! Erase request assembly
//!
//! Decomposes an erase over `[addr, addr + size)` into at most one request
//! per bank touched:
//!
//! ```text
//!              bank 1                      bank 2
//! ├──────┬──────┬──────┬──────┤├──────┬──────┬──────┬──────┤
//!                  [=====range=====]
//!               └─ Pages{B1,2,2} ─┘└ Pages{B2,0,1}┘
//! ```
//!
//! A request that would cover every page of a bank becomes a single
//! `MassErase` of that bank instead.

use core::ops::Range;

use heapless::Vec;
use iflash_hal::BankId;

use crate::error::FlashError;
use crate::geometry::{page_count_for_range, start_page_index, BankLayout, MAX_BANKS};

/// Maximum number of requests a single erase can produce
pub const MAX_ERASE_REQUESTS: usize = MAX_BANKS;

/// Ordered erase requests for one erase call
pub type ErasePlan = Vec<EraseRequest, MAX_ERASE_REQUESTS>;

/// One physical erase operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EraseRequest {
    /// Erase `page_count` pages of `bank` starting at `start_page`
    ///
    /// `start_page + page_count` never exceeds the bank's page count.
    Pages {
        bank: BankId,
        start_page: u32,
        page_count: u32,
    },
    /// Erase every page of `bank` in one operation
    MassErase { bank: BankId },
}

impl EraseRequest {
    /// Bank this request targets
    pub fn bank(&self) -> BankId {
        match *self {
            EraseRequest::Pages { bank, .. } | EraseRequest::MassErase { bank } => bank,
        }
    }

    /// Byte range this request erases
    ///
    /// Always whole pages, so it can be wider than the range the caller
    /// asked for. Returns `None` if the bank is not part of `layout`.
    pub fn address_range(&self, layout: &BankLayout) -> Option<Range<u64>> {
        let bank = layout.bank(self.bank())?;
        let page_size = u64::from(bank.page_size_bytes);
        let base = u64::from(bank.base_address);

        match *self {
            EraseRequest::Pages {
                start_page,
                page_count,
                ..
            } => {
                let start = base + u64::from(start_page) * page_size;
                Some(start..start + u64::from(page_count) * page_size)
            }
            EraseRequest::MassErase { .. } => Some(base..bank.end_address()),
        }
    }
}

/// Build the erase requests for `[addr, addr + size)`
///
/// Requests are ordered by bank base address, matching the byte order of
/// the range. Fails with [`FlashError::UnsupportedSpan`] if the pages to
/// erase do not fit inside their bank.
pub fn assemble(addr: u32, size: u32, layout: &BankLayout) -> Result<ErasePlan, FlashError> {
    let mut plan = ErasePlan::new();

    for sub in layout.split_range_by_bank(addr, size)? {
        let bank = sub.bank;
        let page_size = bank.page_size_bytes;

        let start_page = start_page_index(sub.address, bank.base_address, page_size)
            .ok_or(FlashError::AddressOutOfRange)?;
        let page_count = page_count_for_range(sub.address - bank.base_address, sub.size, page_size);

        if u64::from(start_page) + u64::from(page_count) > u64::from(bank.total_pages) {
            return Err(FlashError::UnsupportedSpan);
        }

        let request = if page_count == bank.total_pages {
            EraseRequest::MassErase { bank: bank.id }
        } else {
            EraseRequest::Pages {
                bank: bank.id,
                start_page,
                page_count,
            }
        };

        trace!("erase plan: {}", request);
        plan.push(request).map_err(|_| FlashError::UnsupportedSpan)?;
    }

    Ok(plan)
}
