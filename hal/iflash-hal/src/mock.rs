//! Mock flash controller for testing
//!
//! Provides an in-memory flash simulation for host-side unit tests.

use std::vec;
use std::vec::Vec;

use crate::flash::{BankId, ControllerError, FlashController, ERASED_BYTE};

/// A controller call recorded by [`MockController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `unlock()`
    Unlock,
    /// `lock()`
    Lock,
    /// `erase_pages(bank, start_page, page_count)`
    ErasePages {
        bank: BankId,
        start_page: u32,
        page_count: u32,
    },
    /// `mass_erase(bank)`
    MassErase { bank: BankId },
    /// `program_unit(address, ..)`
    Program { address: u32 },
    /// `read(address, buf)`
    Read { address: u32, len: usize },
}

impl Operation {
    /// Kind of this operation, ignoring its arguments
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Unlock => OperationKind::Unlock,
            Operation::Lock => OperationKind::Lock,
            Operation::ErasePages { .. } => OperationKind::ErasePages,
            Operation::MassErase { .. } => OperationKind::MassErase,
            Operation::Program { .. } => OperationKind::Program,
            Operation::Read { .. } => OperationKind::Read,
        }
    }
}

/// Operation kinds, used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Unlock,
    Lock,
    ErasePages,
    MassErase,
    Program,
    Read,
}

/// Mock flash controller
///
/// Simulates flash in memory. Supports:
/// - Page and mass erase per bank (memory reset to `0xFF`)
/// - Double-word programming with NOR semantics (target must be erased)
/// - Lock state tracking (erase/program while locked fail)
/// - Failure injection for a chosen operation
/// - Dropped writes, for testing read-back verification
/// - A log of every call, for checking erase sequencing
///
/// # Example
///
/// ```
/// use iflash_hal::{BankId, FlashController, MockController};
///
/// let mut flash = MockController::new(0x0800_0000, 64 * 1024, 2048);
/// flash.unlock().unwrap();
///
/// flash.erase_pages(BankId::Bank1, 0, 1).unwrap();
/// flash.program_unit(0x0800_0000, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
///
/// let mut buf = [0u8; 8];
/// flash.read(0x0800_0000, &mut buf).unwrap();
/// assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct MockController {
    /// First byte of simulated flash
    base: u32,
    /// Erase page size
    page_size: u32,
    /// Start of bank 2, if dual-bank
    bank2_base: Option<u32>,
    /// Flash contents (erased state is 0xFF)
    memory: Vec<u8>,
    /// Control registers locked
    locked: bool,
    /// Programming reports success without storing data
    drop_writes: bool,
    /// Fail the nth (0-based) call of the given kind
    failure: Option<(OperationKind, usize)>,
    /// Every call made, in order
    operations: Vec<Operation>,
}

impl MockController {
    /// Create a single-bank mock covering `[base, base + size)`
    ///
    /// The controller starts locked and fully erased.
    pub fn new(base: u32, size: u32, page_size: u32) -> Self {
        Self {
            base,
            page_size,
            bank2_base: None,
            memory: vec![ERASED_BYTE; size as usize],
            locked: true,
            drop_writes: false,
            failure: None,
            operations: Vec::new(),
        }
    }

    /// Create a dual-bank mock, with bank 2 starting at `bank2_base`
    pub fn dual_bank(base: u32, size: u32, page_size: u32, bank2_base: u32) -> Self {
        Self {
            bank2_base: Some(bank2_base),
            ..Self::new(base, size, page_size)
        }
    }

    /// Fail the `nth` (0-based) future call of `kind`
    ///
    /// Counting includes calls already made, so `fail_on(kind, 0)` only
    /// triggers if no such call has happened yet.
    pub fn fail_on(&mut self, kind: OperationKind, nth: usize) {
        self.failure = Some((kind, nth));
    }

    /// Make programming succeed without storing any data
    pub fn simulate_dropped_writes(&mut self, drop: bool) {
        self.drop_writes = drop;
    }

    /// Store data directly, bypassing lock and erase rules
    pub fn load(&mut self, address: u32, data: &[u8]) {
        let start = self.offset(address);
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    /// Get flash contents (for test verification)
    pub fn contents(&self, address: u32, len: usize) -> &[u8] {
        let start = self.offset(address);
        &self.memory[start..start + len]
    }

    /// All calls made so far
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Erase and mass-erase calls made so far, in order
    pub fn erase_operations(&self) -> Vec<Operation> {
        self.operations
            .iter()
            .copied()
            .filter(|op| {
                matches!(
                    op.kind(),
                    OperationKind::ErasePages | OperationKind::MassErase
                )
            })
            .collect()
    }

    /// Check if the control registers are locked
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn offset(&self, address: u32) -> usize {
        (address - self.base) as usize
    }

    fn end(&self) -> u32 {
        self.base + self.memory.len() as u32
    }

    /// Byte range `[start, end)` of a bank
    fn bank_bounds(&self, bank: BankId) -> Result<(u32, u32), ControllerError> {
        match (bank, self.bank2_base) {
            (BankId::Bank1, Some(split)) => Ok((self.base, split)),
            (BankId::Bank1, None) => Ok((self.base, self.end())),
            (BankId::Bank2, Some(split)) => Ok((split, self.end())),
            (BankId::Bank2, None) => Err(ControllerError::Unsupported),
        }
    }

    /// Log the call and apply failure injection
    fn record(&mut self, op: Operation) -> Result<(), ControllerError> {
        let kind = op.kind();
        let previous = self.operations.iter().filter(|o| o.kind() == kind).count();
        self.operations.push(op);

        match self.failure {
            Some((fail_kind, nth)) if fail_kind == kind && nth == previous => Err(match kind {
                OperationKind::Unlock | OperationKind::Lock => ControllerError::Locked,
                OperationKind::ErasePages | OperationKind::MassErase => {
                    ControllerError::EraseFailed
                }
                OperationKind::Program => ControllerError::ProgramFailed,
                OperationKind::Read => ControllerError::Busy,
            }),
            _ => Ok(()),
        }
    }

    fn erase_span(&mut self, start: u32, end: u32) {
        let (start, end) = (self.offset(start), self.offset(end));
        self.memory[start..end].fill(ERASED_BYTE);
    }
}

impl FlashController for MockController {
    const PROGRAM_UNIT_SIZE: usize = 8;

    fn unlock(&mut self) -> Result<(), ControllerError> {
        self.record(Operation::Unlock)?;
        self.locked = false;
        Ok(())
    }

    fn lock(&mut self) -> Result<(), ControllerError> {
        self.record(Operation::Lock)?;
        self.locked = true;
        Ok(())
    }

    fn erase_pages(
        &mut self,
        bank: BankId,
        start_page: u32,
        page_count: u32,
    ) -> Result<(), ControllerError> {
        self.record(Operation::ErasePages {
            bank,
            start_page,
            page_count,
        })?;
        if self.locked {
            return Err(ControllerError::Locked);
        }

        let (bank_start, bank_end) = self.bank_bounds(bank)?;
        let start = u64::from(bank_start) + u64::from(start_page) * u64::from(self.page_size);
        let end = start + u64::from(page_count) * u64::from(self.page_size);
        if page_count == 0 || end > u64::from(bank_end) {
            return Err(ControllerError::EraseFailed);
        }

        self.erase_span(start as u32, end as u32);
        Ok(())
    }

    fn mass_erase(&mut self, bank: BankId) -> Result<(), ControllerError> {
        self.record(Operation::MassErase { bank })?;
        if self.locked {
            return Err(ControllerError::Locked);
        }

        let (start, end) = self.bank_bounds(bank)?;
        self.erase_span(start, end);
        Ok(())
    }

    fn program_unit(&mut self, address: u32, unit: &[u8]) -> Result<(), ControllerError> {
        self.record(Operation::Program { address })?;
        if self.locked {
            return Err(ControllerError::Locked);
        }

        let in_bounds = address >= self.base
            && u64::from(address) + unit.len() as u64 <= u64::from(self.end());
        if unit.len() != Self::PROGRAM_UNIT_SIZE
            || address % Self::PROGRAM_UNIT_SIZE as u32 != 0
            || !in_bounds
        {
            return Err(ControllerError::ProgramFailed);
        }

        let start = self.offset(address);
        let target = &mut self.memory[start..start + unit.len()];
        if target.iter().any(|&b| b != ERASED_BYTE) {
            return Err(ControllerError::ProgramFailed);
        }
        if !self.drop_writes {
            target.copy_from_slice(unit);
        }
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), ControllerError> {
        self.record(Operation::Read {
            address,
            len: buf.len(),
        })?;

        if address < self.base || u64::from(address) + buf.len() as u64 > u64::from(self.end()) {
            return Err(ControllerError::Unsupported);
        }

        let start = self.offset(address);
        buf.copy_from_slice(&self.memory[start..start + buf.len()]);
        Ok(())
    }
}
