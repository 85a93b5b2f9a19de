//! Flash geometry
//!
//! Page arithmetic and the description of the flash banks. Everything
//! here is pure: no state, no hardware access.

pub mod address;
pub mod bank;

pub use address::{is_aligned, page_count_for_range, start_page_index};
pub use bank::{Bank, BankLayout, SubRange, MAX_BANKS};
