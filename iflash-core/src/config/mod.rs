//! Configuration types
//!
//! Flash geometry and driver policy, fixed for the lifetime of a driver.

pub mod flash;

pub use flash::*;
