//! iflash Hardware Abstraction Layer
//!
//! This crate defines the capability a chip-specific flash driver has to
//! provide so that the portable erase planning and region checking in
//! `iflash-core` can run on any part.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application (bootloader, config store) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  iflash-core (region, banks, erase plan)│
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  iflash-hal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  chip driver  │       │MockController │
//! │ (out of tree) │       │ (feature mock)│
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::FlashController`] - unlock/lock, page and mass erase,
//!   unit programming and mapped reads

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

pub mod flash;
#[cfg(feature = "mock")]
pub mod mock;

// Re-export key types at crate root for convenience
pub use flash::{BankId, ControllerError, FlashController, ERASED_BYTE};
#[cfg(feature = "mock")]
pub use mock::{MockController, Operation, OperationKind};
