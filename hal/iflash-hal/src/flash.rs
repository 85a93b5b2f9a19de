//! Flash controller abstractions
//!
//! Provides the trait a chip-specific driver implements on top of the
//! flash peripheral registers. Every operation is blocking: it returns
//! once the controller has left its busy state.

/// Value of a flash byte after erasure
pub const ERASED_BYTE: u8 = 0xFF;

/// Identifies one independently erasable flash bank
///
/// Single-bank parts only ever use `Bank1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BankId {
    /// First bank, starting at the flash base address
    Bank1 = 1,
    /// Second bank (dual-bank mode only)
    Bank2 = 2,
}

/// Errors reported by a flash controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerError {
    /// Controller is locked, or unlocking was refused
    ///
    /// Most parts need a reset before another unlock attempt succeeds.
    Locked,
    /// Controller did not leave its busy state
    Busy,
    /// Programming a unit failed (target not erased, alignment, ...)
    ProgramFailed,
    /// Page or bank erase failed
    EraseFailed,
    /// Target address is write protected
    WriteProtected,
    /// Read-back after programming did not match the written data
    VerifyFailed,
    /// Operation not supported by this controller
    Unsupported,
}

/// Flash controller capability
///
/// Implemented by chip-specific drivers. The portable core only calls
/// these primitives after it has validated the address range, so an
/// implementation may assume page indices and addresses are in bounds.
pub trait FlashController {
    /// Size of one atomic program unit in bytes (e.g. 8 for a double word)
    const PROGRAM_UNIT_SIZE: usize;

    /// Unlock the flash control registers for programming and erasing
    fn unlock(&mut self) -> Result<(), ControllerError>;

    /// Lock the flash control registers again
    fn lock(&mut self) -> Result<(), ControllerError>;

    /// Erase `page_count` consecutive pages of `bank`, starting at `start_page`
    ///
    /// Page indices are relative to the start of the bank.
    fn erase_pages(
        &mut self,
        bank: BankId,
        start_page: u32,
        page_count: u32,
    ) -> Result<(), ControllerError>;

    /// Erase the whole bank in a single operation
    fn mass_erase(&mut self, bank: BankId) -> Result<(), ControllerError>;

    /// Program one unit at `address`
    ///
    /// `unit` is exactly [`Self::PROGRAM_UNIT_SIZE`] bytes long and `address`
    /// is aligned to that size. The target must have been erased.
    fn program_unit(&mut self, address: u32, unit: &[u8]) -> Result<(), ControllerError>;

    /// Copy mapped flash contents starting at `address` into `buf`
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), ControllerError>;
}
