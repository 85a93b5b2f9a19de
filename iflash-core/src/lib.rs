//! Portable internal flash driver logic
//!
//! This crate contains everything that does not depend on a specific
//! flash controller:
//!
//! - Page arithmetic and the single/dual bank model
//! - Erase planning (page erase vs. mass erase, per bank)
//! - User region bounds checking
//! - The [`FlashDriver`] facade over a [`FlashController`]
//! - An `embedded-storage` [`NorFlash`](embedded_storage::nor_flash::NorFlash) adapter
//!
//! Controllers implement [`iflash_hal::FlashController`]; the driver only
//! ever calls them with requests that fit the configured bank layout.
//!
//! [`FlashController`]: iflash_hal::FlashController

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod log;

pub mod config;
pub mod driver;
pub mod erase;
pub mod error;
pub mod geometry;
pub mod safety;
pub mod storage;

pub use config::{ConfigError, FlashConfig, FlashRegion};
pub use driver::{FlashDriver, MAX_PROGRAM_UNIT_SIZE};
pub use erase::{assemble, ErasePlan, EraseRequest};
pub use error::FlashError;
pub use geometry::{Bank, BankLayout};
pub use safety::RegionGuard;
pub use storage::RegionStorage;
