//! Page arithmetic
//!
//! Converts byte ranges into page indices and page counts for a fixed
//! page size. Intermediate sums are computed in `u64`, so ranges ending
//! at the top of the 32-bit address space do not wrap.

/// Number of whole pages intersected by the byte range `[addr, addr + size)`
///
/// A range that starts or ends in the middle of a page still counts that
/// page. Alignment is not enforced here.
///
/// Returns 0 for an empty range or a zero page size.
pub const fn page_count_for_range(addr: u32, size: u32, page_size: u32) -> u32 {
    if size == 0 || page_size == 0 {
        return 0;
    }

    let page_size = page_size as u64;
    let start_page = addr as u64 / page_size;
    let end_page = (addr as u64 + size as u64 - 1) / page_size;

    (end_page - start_page + 1) as u32
}

/// Index of the page containing `addr`, counted from `bank_base`
///
/// Returns `None` if `addr` lies below `bank_base` or `page_size` is 0.
pub const fn start_page_index(addr: u32, bank_base: u32, page_size: u32) -> Option<u32> {
    match addr.checked_sub(bank_base) {
        Some(offset) => offset.checked_div(page_size),
        None => None,
    }
}

/// Check if `value` is a multiple of `alignment`
///
/// An alignment of 0 never matches.
pub const fn is_aligned(value: u32, alignment: u32) -> bool {
    match value.checked_rem(alignment) {
        Some(rem) => rem == 0,
        None => false,
    }
}
