//! Flash driver facade
//!
//! Owns the controller, the validated configuration and the init state.
//! Every entry point checks, in order: initialization, arguments, region
//! bounds. Only then is the controller called.

use iflash_hal::{FlashController, ERASED_BYTE};

use crate::config::{ConfigError, FlashConfig, FlashRegion};
use crate::erase::{assemble, ErasePlan, EraseRequest};
use crate::error::FlashError;
use crate::geometry::{is_aligned, BankLayout};
use crate::safety::RegionGuard;

/// Largest controller program unit the driver can buffer
pub const MAX_PROGRAM_UNIT_SIZE: usize = 32;

/// Internal flash driver
///
/// Created once from a controller and a configuration. Between
/// [`init`](Self::init) and [`deinit`](Self::deinit) the controller is kept
/// unlocked, unless `relock_after_operation` is set, in which case every
/// write and erase unlocks and relocks it.
///
/// Hardware failures during a multi-step write or erase stop at the failing
/// step. Nothing is rolled back or retried: the affected range must be
/// treated as indeterminate.
#[derive(Debug)]
pub struct FlashDriver<C> {
    controller: C,
    config: FlashConfig,
    layout: BankLayout,
    guard: RegionGuard,
    initialized: bool,
}

impl<C: FlashController> FlashDriver<C> {
    /// Create a driver, validating the configuration
    ///
    /// The driver starts uninitialized; the controller is not touched.
    pub fn new(controller: C, config: FlashConfig) -> Result<Self, ConfigError> {
        if C::PROGRAM_UNIT_SIZE == 0 || C::PROGRAM_UNIT_SIZE > MAX_PROGRAM_UNIT_SIZE {
            return Err(ConfigError::UnsupportedProgramUnit);
        }

        let layout = config.validate()?;

        Ok(Self {
            controller,
            config,
            layout,
            guard: RegionGuard::new(config.region),
            initialized: false,
        })
    }

    /// Initialize the driver
    ///
    /// Unlocks the controller. Calling it again while initialized is a no-op.
    pub fn init(&mut self) -> Result<(), FlashError> {
        if self.initialized {
            return Ok(());
        }

        if !self.config.relock_after_operation {
            self.controller.unlock().map_err(|e| {
                error!("flash unlock failed: {}", e);
                FlashError::from(e)
            })?;
        }

        self.initialized = true;
        info!(
            "flash initialized, region 0x{:08x}+{}",
            self.config.region.start_address, self.config.region.size_bytes
        );
        Ok(())
    }

    /// De-initialize the driver
    ///
    /// Locks the controller. A no-op if not initialized. If locking fails
    /// the driver stays initialized.
    pub fn deinit(&mut self) -> Result<(), FlashError> {
        if !self.initialized {
            return Ok(());
        }

        if !self.config.relock_after_operation {
            self.controller.lock()?;
        }

        self.initialized = false;
        info!("flash de-initialized");
        Ok(())
    }

    /// Check if the driver is initialized
    pub fn is_init(&self) -> bool {
        self.initialized
    }

    /// Read `buf.len()` bytes starting at `addr`
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.ensure_init()?;
        if buf.is_empty() {
            return Err(FlashError::InvalidArgument);
        }
        let size = u32::try_from(buf.len()).map_err(|_| FlashError::OutOfRegion)?;
        self.guard.validate(addr, size)?;

        self.controller.read(addr, buf)?;
        Ok(())
    }

    /// Program `data` starting at `addr`
    ///
    /// `addr` must be aligned to the controller program unit and the target
    /// must have been erased. A trailing partial unit is padded with `0xFF`;
    /// the padded span must still lie inside the region. Stops at the first
    /// unit that fails.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        self.ensure_init()?;
        if data.is_empty() || !is_aligned(addr, C::PROGRAM_UNIT_SIZE as u32) {
            return Err(FlashError::InvalidArgument);
        }

        let unit = C::PROGRAM_UNIT_SIZE;
        let padded_len = data.len().div_ceil(unit) * unit;
        let padded_size = u32::try_from(padded_len).map_err(|_| FlashError::OutOfRegion)?;
        self.guard.validate(addr, padded_size)?;

        let verify = self.config.verify_writes;
        self.with_unlocked(|driver| {
            let mut address = addr;
            for chunk in data.chunks(unit) {
                let mut buffer = [ERASED_BYTE; MAX_PROGRAM_UNIT_SIZE];
                buffer[..chunk.len()].copy_from_slice(chunk);
                let unit_bytes = &buffer[..unit];

                driver.controller.program_unit(address, unit_bytes).map_err(|e| {
                    error!("program at 0x{:08x} failed: {}", address, e);
                    FlashError::from(e)
                })?;

                if verify {
                    let mut readback = [0u8; MAX_PROGRAM_UNIT_SIZE];
                    driver.controller.read(address, &mut readback[..unit])?;
                    if readback[..unit] != *unit_bytes {
                        error!("verify at 0x{:08x} failed", address);
                        return Err(FlashError::HardwareFailure(
                            iflash_hal::ControllerError::VerifyFailed,
                        ));
                    }
                }

                // The padded span was validated, so this cannot wrap
                address = address.wrapping_add(unit as u32);
            }
            Ok(())
        })
    }

    /// Erase every page touched by `[addr, addr + size)`
    ///
    /// Pages are erased whole, so bytes before `addr` or after the end of
    /// the range that share a page with it are erased too. Use
    /// [`plan_erase`](Self::plan_erase) to see exactly what will be erased.
    pub fn erase(&mut self, addr: u32, size: u32) -> Result<(), FlashError> {
        self.ensure_init()?;
        let plan = self.plan_erase(addr, size)?;

        self.with_unlocked(|driver| driver.execute(&plan))
    }

    /// Erase the whole user region
    pub fn erase_region(&mut self) -> Result<(), FlashError> {
        let region = self.config.region;
        self.erase(region.start_address, region.size_bytes)
    }

    /// Compute the erase requests for `[addr, addr + size)` without
    /// touching the hardware
    pub fn plan_erase(&self, addr: u32, size: u32) -> Result<ErasePlan, FlashError> {
        if size == 0 {
            return Err(FlashError::InvalidArgument);
        }
        self.guard.validate(addr, size)?;

        // The region lies inside the layout, so a failure here is a bug
        self.invariant(assemble(addr, size, &self.layout))
    }

    /// Get the driver configuration
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// Get the bank layout derived from the configuration
    pub fn layout(&self) -> &BankLayout {
        &self.layout
    }

    /// Get the user flash region
    pub fn region(&self) -> &FlashRegion {
        self.guard.region()
    }

    /// Get the underlying controller
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Consume the driver and return the controller
    ///
    /// Call [`deinit`](Self::deinit) first to leave the controller locked.
    pub fn release(self) -> C {
        self.controller
    }

    fn ensure_init(&self) -> Result<(), FlashError> {
        if self.initialized {
            Ok(())
        } else {
            warn!("flash access before init");
            Err(FlashError::NotInitialized)
        }
    }

    /// Submit erase requests in order, stopping at the first failure
    fn execute(&mut self, plan: &ErasePlan) -> Result<(), FlashError> {
        for (step, request) in plan.iter().enumerate() {
            debug!("erase step {}: {}", step, request);

            let result = match *request {
                EraseRequest::Pages {
                    bank,
                    start_page,
                    page_count,
                } => self.controller.erase_pages(bank, start_page, page_count),
                EraseRequest::MassErase { bank } => self.controller.mass_erase(bank),
            };

            result.map_err(|e| {
                error!("erase step {} ({}) failed: {}", step, request, e);
                FlashError::from(e)
            })?;
        }
        Ok(())
    }

    /// Run `op`, bracketed by unlock/lock when relocking is configured
    ///
    /// The controller is relocked even if `op` fails; the error from `op`
    /// takes precedence.
    fn with_unlocked<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, FlashError>,
    ) -> Result<T, FlashError> {
        if !self.config.relock_after_operation {
            return op(self);
        }

        self.controller.unlock()?;
        let result = op(self);
        let locked = self.controller.lock();

        let value = result?;
        locked?;
        Ok(value)
    }

    /// Handle an internal invariant violation
    ///
    /// Panics when assertions are enabled, otherwise passes the error on.
    fn invariant<T>(&self, result: Result<T, FlashError>) -> Result<T, FlashError> {
        if let Err(e) = &result {
            if self.config.assertions_enabled {
                panic!("flash invariant violated: {:?}", e);
            }
            error!("flash invariant violated: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iflash_hal::{BankId, ControllerError, MockController, Operation, OperationKind};

    const BASE: u32 = 0x0800_0000;
    const PAGE: u32 = 2048;
    const FLASH_SIZE: u32 = 128 * 1024;
    const REGION_START: u32 = 0x0801_F000;
    const REGION_SIZE: u32 = 0x1000;

    fn single_config() -> FlashConfig {
        FlashConfig::single_bank(
            BASE,
            FLASH_SIZE,
            PAGE,
            FlashRegion::new(REGION_START, REGION_SIZE),
        )
    }

    fn driver() -> FlashDriver<MockController> {
        let mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        FlashDriver::new(mock, single_config()).unwrap()
    }

    fn init_driver() -> FlashDriver<MockController> {
        let mut driver = driver();
        driver.init().unwrap();
        driver
    }

    /// bank1 = [0, 0x40000), bank2 = [0x40000, 0x80000), 128 pages each
    fn dual_driver(region: FlashRegion) -> FlashDriver<MockController> {
        let mock = MockController::dual_bank(0, 0x8_0000, PAGE, 0x4_0000);
        let config = FlashConfig::dual_bank(0, 0x8_0000, PAGE, 0x4_0000, region);
        let mut driver = FlashDriver::new(mock, config).unwrap();
        driver.init().unwrap();
        driver
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        let config = FlashConfig::single_bank(
            BASE,
            FLASH_SIZE,
            PAGE,
            FlashRegion::new(BASE + FLASH_SIZE, PAGE),
        );
        assert!(matches!(
            FlashDriver::new(mock, config),
            Err(ConfigError::RegionOutsideFlash)
        ));
    }

    #[test]
    fn test_new_rejects_region_sharing_a_page() {
        // Bytes 0x0801_F000..0x0801_F008 belong to the page but not the region
        let mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        let region = FlashRegion::new(REGION_START + 8, PAGE - 8);
        let config = FlashConfig::single_bank(BASE, FLASH_SIZE, PAGE, region);
        assert!(matches!(
            FlashDriver::new(mock, config),
            Err(ConfigError::RegionNotPageAligned)
        ));
    }

    #[test]
    fn test_erase_never_leaves_region() {
        let mut driver = init_driver();
        driver.controller.load(REGION_START - 8, &[0xAA; 8]);
        driver.controller.load(REGION_START + REGION_SIZE, &[0xAA; 8]);

        let plan = driver.plan_erase(REGION_START + 8, REGION_SIZE - 16).unwrap();
        for request in &plan {
            let range = request.address_range(driver.layout()).unwrap();
            assert!(range.start >= u64::from(REGION_START));
            assert!(range.end <= u64::from(REGION_START + REGION_SIZE));
        }

        driver.erase_region().unwrap();
        assert_eq!(driver.controller().contents(REGION_START - 8, 8), &[0xAA; 8]);
        assert_eq!(
            driver.controller().contents(REGION_START + REGION_SIZE, 8),
            &[0xAA; 8]
        );
    }

    #[test]
    fn test_init_twice() {
        let mut driver = driver();
        assert_eq!(driver.init(), Ok(()));
        assert_eq!(driver.init(), Ok(()));
        assert!(driver.is_init());

        // Second init does not touch the controller
        assert_eq!(driver.controller().operations(), &[Operation::Unlock]);
        assert!(!driver.controller().is_locked());
    }

    #[test]
    fn test_deinit_without_init() {
        let mut driver = driver();
        assert_eq!(driver.deinit(), Ok(()));
        assert!(!driver.is_init());
        assert!(driver.controller().operations().is_empty());
    }

    #[test]
    fn test_deinit_locks() {
        let mut driver = init_driver();
        assert_eq!(driver.deinit(), Ok(()));
        assert!(!driver.is_init());
        assert!(driver.controller().is_locked());
    }

    #[test]
    fn test_failed_unlock_leaves_uninitialized() {
        let mut mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        mock.fail_on(OperationKind::Unlock, 0);
        let mut driver = FlashDriver::new(mock, single_config()).unwrap();

        assert_eq!(
            driver.init(),
            Err(FlashError::HardwareFailure(ControllerError::Locked))
        );
        assert!(!driver.is_init());
    }

    #[test]
    fn test_failed_lock_stays_initialized() {
        let mut mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        mock.fail_on(OperationKind::Lock, 0);
        let mut driver = FlashDriver::new(mock, single_config()).unwrap();
        driver.init().unwrap();

        assert!(driver.deinit().is_err());
        assert!(driver.is_init());
    }

    #[test]
    fn test_not_initialized() {
        let mut driver = driver();
        let mut buf = [0u8; 8];

        assert_eq!(driver.read(REGION_START, &mut buf), Err(FlashError::NotInitialized));
        assert_eq!(driver.write(REGION_START, &buf), Err(FlashError::NotInitialized));
        assert_eq!(driver.erase(REGION_START, PAGE), Err(FlashError::NotInitialized));
        assert!(driver.controller().operations().is_empty());
    }

    #[test]
    fn test_out_of_region() {
        let mut driver = init_driver();
        let mut buf = [0u8; 8];

        assert_eq!(
            driver.read(REGION_START - 8, &mut buf),
            Err(FlashError::OutOfRegion)
        );
        assert_eq!(
            driver.write(REGION_START + REGION_SIZE - 8, &[0; 16]),
            Err(FlashError::OutOfRegion)
        );
        assert_eq!(
            driver.erase(REGION_START - PAGE, PAGE),
            Err(FlashError::OutOfRegion)
        );
        // Only the unlock from init reached the controller
        assert_eq!(driver.controller().operations(), &[Operation::Unlock]);
    }

    #[test]
    fn test_invalid_arguments() {
        let mut driver = init_driver();

        assert_eq!(driver.read(REGION_START, &mut []), Err(FlashError::InvalidArgument));
        assert_eq!(driver.write(REGION_START, &[]), Err(FlashError::InvalidArgument));
        assert_eq!(driver.write(REGION_START + 4, &[0; 8]), Err(FlashError::InvalidArgument));
        assert_eq!(driver.erase(REGION_START, 0), Err(FlashError::InvalidArgument));
    }

    #[test]
    fn test_write_then_read() {
        let mut driver = init_driver();
        let data: [u8; 16] = core::array::from_fn(|i| i as u8);

        driver.write(REGION_START, &data).unwrap();

        let mut buf = [0u8; 16];
        driver.read(REGION_START, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_write_pads_last_unit() {
        let mut driver = init_driver();
        driver.write(REGION_START, &[0x11, 0x22, 0x33]).unwrap();

        assert_eq!(
            driver.controller().contents(REGION_START, 8),
            &[0x11, 0x22, 0x33, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(
            driver.controller().operations(),
            &[
                Operation::Unlock,
                Operation::Program {
                    address: REGION_START
                }
            ]
        );
    }

    #[test]
    fn test_write_programs_units_in_order() {
        let mut driver = init_driver();
        driver.write(REGION_START, &[0xAB; 20]).unwrap();

        let programs: Vec<u32> = driver
            .controller()
            .operations()
            .iter()
            .filter_map(|op| match op {
                Operation::Program { address } => Some(*address),
                _ => None,
            })
            .collect();
        assert_eq!(programs, [REGION_START, REGION_START + 8, REGION_START + 16]);
    }

    #[test]
    fn test_write_stops_at_first_failure() {
        let mut mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        mock.fail_on(OperationKind::Program, 1);
        let mut driver = FlashDriver::new(mock, single_config()).unwrap();
        driver.init().unwrap();

        assert_eq!(
            driver.write(REGION_START, &[0x55; 32]),
            Err(FlashError::HardwareFailure(ControllerError::ProgramFailed))
        );

        let flash = driver.controller();
        let programs = flash
            .operations()
            .iter()
            .filter(|op| op.kind() == OperationKind::Program)
            .count();
        assert_eq!(programs, 2);
        assert_eq!(flash.contents(REGION_START, 8), &[0x55; 8]);
        assert_eq!(flash.contents(REGION_START + 16, 8), &[0xFF; 8]);
    }

    #[test]
    fn test_write_verify_detects_dropped_write() {
        let mut mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        mock.simulate_dropped_writes(true);
        let mut driver = FlashDriver::new(mock, single_config().with_verify(true)).unwrap();
        driver.init().unwrap();

        assert_eq!(
            driver.write(REGION_START, &[0x00; 8]),
            Err(FlashError::HardwareFailure(ControllerError::VerifyFailed))
        );
    }

    #[test]
    fn test_write_without_verify_misses_dropped_write() {
        let mut mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        mock.simulate_dropped_writes(true);
        let mut driver = FlashDriver::new(mock, single_config()).unwrap();
        driver.init().unwrap();

        assert_eq!(driver.write(REGION_START, &[0x00; 8]), Ok(()));
    }

    #[test]
    fn test_erase_single_page() {
        let mut driver = init_driver();
        driver.write(REGION_START, &[0u8; 8]).unwrap();

        driver.erase(REGION_START, PAGE).unwrap();

        let flash = driver.controller();
        assert_eq!(
            flash.erase_operations(),
            [Operation::ErasePages {
                bank: BankId::Bank1,
                start_page: 62,
                page_count: 1
            }]
        );
        assert_eq!(flash.contents(REGION_START, 8), &[0xFF; 8]);
    }

    #[test]
    fn test_erase_region() {
        let mut driver = init_driver();
        driver.erase_region().unwrap();

        assert_eq!(
            driver.controller().erase_operations(),
            [Operation::ErasePages {
                bank: BankId::Bank1,
                start_page: 62,
                page_count: 2
            }]
        );
    }

    #[test]
    fn test_erase_whole_single_bank_uses_mass_erase() {
        let mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        let config =
            FlashConfig::single_bank(BASE, FLASH_SIZE, PAGE, FlashRegion::new(BASE, FLASH_SIZE));
        let mut driver = FlashDriver::new(mock, config).unwrap();
        driver.init().unwrap();

        driver.erase(BASE, FLASH_SIZE).unwrap();
        assert_eq!(
            driver.controller().erase_operations(),
            [Operation::MassErase {
                bank: BankId::Bank1
            }]
        );
    }

    #[test]
    fn test_erase_spanning_banks() {
        let mut driver = dual_driver(FlashRegion::new(0x2_0000, 0x4_0000));
        driver.erase(0x3_F800, 0x1000).unwrap();

        assert_eq!(
            driver.controller().erase_operations(),
            [
                Operation::ErasePages {
                    bank: BankId::Bank1,
                    start_page: 127,
                    page_count: 1
                },
                Operation::ErasePages {
                    bank: BankId::Bank2,
                    start_page: 0,
                    page_count: 1
                },
            ]
        );
    }

    #[test]
    fn test_erase_stops_after_first_bank_failure() {
        let mut driver = dual_driver(FlashRegion::new(0, 0x8_0000));
        driver.controller.fail_on(OperationKind::MassErase, 0);

        assert_eq!(
            driver.erase(0, 0x8_0000),
            Err(FlashError::HardwareFailure(ControllerError::EraseFailed))
        );
        // Bank 2 was never submitted
        assert_eq!(
            driver.controller().erase_operations(),
            [Operation::MassErase {
                bank: BankId::Bank1
            }]
        );
    }

    #[test]
    fn test_erase_second_step_failure_keeps_first() {
        let mut driver = dual_driver(FlashRegion::new(0, 0x8_0000));
        driver.controller.load(0x3_F800, &[0; 8]);
        driver.controller.load(0x4_0000, &[0; 8]);
        driver.controller.fail_on(OperationKind::ErasePages, 1);

        assert!(driver.erase(0x3_F800, 0x1000).is_err());

        // No rollback: bank 1 page is erased, bank 2 page untouched
        let flash = driver.controller();
        assert_eq!(flash.contents(0x3_F800, 8), &[0xFF; 8]);
        assert_eq!(flash.contents(0x4_0000, 8), &[0; 8]);
    }

    #[test]
    fn test_plan_erase_without_init() {
        let driver = driver();
        let plan = driver.plan_erase(REGION_START + 1, 1).unwrap();
        assert_eq!(
            plan.as_slice(),
            &[EraseRequest::Pages {
                bank: BankId::Bank1,
                start_page: 62,
                page_count: 1
            }]
        );
        assert_eq!(
            plan[0].address_range(driver.layout()),
            Some(u64::from(REGION_START)..u64::from(REGION_START + PAGE))
        );
        assert!(driver.controller().operations().is_empty());
    }

    #[test]
    fn test_relock_brackets_operations() {
        let mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        let mut driver = FlashDriver::new(mock, single_config().with_relock(true)).unwrap();

        driver.init().unwrap();
        assert!(driver.controller().operations().is_empty());

        driver.erase(REGION_START, PAGE).unwrap();
        driver.write(REGION_START, &[1; 8]).unwrap();
        driver.deinit().unwrap();

        assert_eq!(
            driver.controller().operations(),
            &[
                Operation::Unlock,
                Operation::ErasePages {
                    bank: BankId::Bank1,
                    start_page: 62,
                    page_count: 1
                },
                Operation::Lock,
                Operation::Unlock,
                Operation::Program {
                    address: REGION_START
                },
                Operation::Lock,
            ]
        );
        assert!(driver.controller().is_locked());
    }

    #[test]
    fn test_relock_after_failed_operation() {
        let mut mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        mock.fail_on(OperationKind::ErasePages, 0);
        let mut driver = FlashDriver::new(mock, single_config().with_relock(true)).unwrap();
        driver.init().unwrap();

        assert_eq!(
            driver.erase(REGION_START, PAGE),
            Err(FlashError::HardwareFailure(ControllerError::EraseFailed))
        );
        assert!(driver.controller().is_locked());
    }

    #[test]
    fn test_invariant_returns_error_without_assertions() {
        let mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        let driver = FlashDriver::new(mock, single_config().with_assertions(false)).unwrap();

        let result: Result<(), FlashError> = Err(FlashError::UnsupportedSpan);
        assert_eq!(driver.invariant(result), Err(FlashError::UnsupportedSpan));
    }

    #[test]
    #[should_panic(expected = "flash invariant violated")]
    fn test_invariant_panics_with_assertions() {
        let mock = MockController::new(BASE, FLASH_SIZE, PAGE);
        let driver = FlashDriver::new(mock, single_config().with_assertions(true)).unwrap();

        let result: Result<(), FlashError> = Err(FlashError::UnsupportedSpan);
        let _ = driver.invariant(result);
    }

    #[test]
    fn test_release_returns_controller() {
        let mut driver = init_driver();
        driver.deinit().unwrap();
        let flash = driver.release();
        assert_eq!(flash.operations(), &[Operation::Unlock, Operation::Lock]);
    }
}
