//! Region guard implementation
//!
//! The single gate between caller-supplied addresses and the rest of the
//! driver. Applies identically to read, write and erase.

use crate::config::FlashRegion;
use crate::error::FlashError;

/// Bounds check against the user flash region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegionGuard {
    region: FlashRegion,
}

impl RegionGuard {
    /// Create a guard for `region`
    pub const fn new(region: FlashRegion) -> Self {
        Self { region }
    }

    /// Get the guarded region
    pub const fn region(&self) -> &FlashRegion {
        &self.region
    }

    /// Check that `[addr, addr + size)` lies entirely inside the region
    ///
    /// Requires `addr >= start` and `addr + size <= start + size_bytes`.
    /// The sum is taken without wrapping, so a range that would overflow
    /// the address space is rejected.
    pub fn validate(&self, addr: u32, size: u32) -> Result<(), FlashError> {
        let end = u64::from(addr) + u64::from(size);

        if addr < self.region.start_address || end > self.region.end_address() {
            warn!(
                "rejected access 0x{:08x}+{} outside region 0x{:08x}+{}",
                addr, size, self.region.start_address, self.region.size_bytes
            );
            return Err(FlashError::OutOfRegion);
        }

        Ok(())
    }
}
