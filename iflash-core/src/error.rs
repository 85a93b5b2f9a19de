//! Error types
//!
//! Every failure of a driver operation is reported as a [`FlashError`].
//! Input validation happens before any hardware call, so an error other
//! than [`FlashError::HardwareFailure`] guarantees flash was not touched.

use iflash_hal::ControllerError;

/// Errors from flash driver operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Read, write or erase called before a successful `init`
    NotInitialized,
    /// Address range is not entirely inside the user flash region
    OutOfRegion,
    /// Address does not belong to any flash bank
    AddressOutOfRange,
    /// Range cannot be represented in the bank model
    ///
    /// Raised when a range would cross more than two banks, or when the
    /// pages it touches run past the end of a bank.
    UnsupportedSpan,
    /// Controller reported a failure
    ///
    /// For multi-step operations the target range is now in an
    /// indeterminate state: steps before the failing one have completed.
    HardwareFailure(ControllerError),
    /// Empty buffer, zero size, or misaligned address
    InvalidArgument,
}

impl From<ControllerError> for FlashError {
    fn from(e: ControllerError) -> Self {
        FlashError::HardwareFailure(e)
    }
}
