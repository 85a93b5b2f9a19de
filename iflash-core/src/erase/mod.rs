//! Erase planning
//!
//! Turns a byte range into the ordered list of page and bank erases the
//! controller has to perform.

pub mod assembler;

pub use assembler::{assemble, ErasePlan, EraseRequest, MAX_ERASE_REQUESTS};
