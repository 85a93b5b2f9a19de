//! Access safety
//!
//! Rejects operations outside the configured user flash region before
//! any other component sees them.

pub mod guard;

pub use guard::RegionGuard;
