//! Board support seam
//!
//! The safety MCU's memory map, pin multiplexing and clock tree are plain
//! register programming owned by the board layer. The codec driver only
//! needs two things from it: word-level register access and a one-shot
//! bring-up call at boot. Both are traits here so host tests can substitute
//! a register file.

/// 32-bit memory-mapped register access.
pub trait RegisterInterface {
    /// Read the word at `address`.
    fn read32(&self, address: u32) -> u32;

    /// Write `value` to the word at `address`.
    fn write32(&mut self, address: u32, value: u32);

    /// Read-modify-write: clear `mask`, then set `value & mask`.
    fn modify32(&mut self, address: u32, mask: u32, value: u32) {
        let current = self.read32(address);
        self.write32(address, (current & !mask) | (value & mask));
    }

    /// Spin until `(read32(address) & mask) == expected` or `policy` runs out.
    ///
    /// Board bring-up has no delay source yet, so attempts are back-to-back.
    fn poll32(
        &self,
        address: u32,
        mask: u32,
        expected: u32,
        policy: crate::retry::RetryPolicy,
    ) -> Result<u16, crate::retry::RetryExhausted> {
        let mut budget = policy.budget();
        loop {
            if self.read32(address) & mask == expected {
                return Ok(budget.used());
            }
            if !budget.try_consume() {
                return Err(crate::retry::RetryExhausted {
                    attempts: budget.used(),
                });
            }
        }
    }
}

/// Pin and clock bring-up, invoked once at boot.
///
/// No return value and no error channel: a board that cannot bring up its
/// clocks has nothing useful to report to.
pub trait BoardBringUp {
    /// Program clocks, PLLs and pin multiplexing.
    fn bring_up(&mut self);
}

/// Volatile access to the physical address space.
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Create the MMIO accessor.
    ///
    /// # Safety
    ///
    /// Every address later passed to [`RegisterInterface`] methods must be a
    /// valid, 4-byte aligned device register on the running chip, and no
    /// other code may hold a Rust reference to that memory.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterInterface for Mmio {
    fn read32(&self, address: u32) -> u32 {
        let ptr = address as usize as *const u32;
        // SAFETY: `Mmio::new` requires every address to be an aligned device
        // register that no Rust reference aliases.
        unsafe { core::ptr::read_volatile(ptr) }
    }

    fn write32(&mut self, address: u32, value: u32) {
        let ptr = address as usize as *mut u32;
        // SAFETY: see `read32`.
        unsafe { core::ptr::write_volatile(ptr, value) }
    }
}

/// CPU core of the board's safety MCU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CpuCore {
    /// ARM Cortex-R4
    CortexR4,
    /// ARM Cortex-R4F (with FPU)
    CortexR4F,
    /// ARM Cortex-R5F (with FPU)
    CortexR5F,
}

/// Memory sizes and peripheral counts of a chip variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipProfile {
    /// CPU core
    pub core: CpuCore,
    /// Program flash in bytes
    pub program_flash: u32,
    /// SRAM in bytes
    pub sram: u32,
    /// Data flash (EEPROM emulation) in bytes
    pub data_flash: u32,
    /// DCAN controllers
    pub can: u8,
    /// MibADC modules
    pub adc: u8,
    /// Channels per MibADC
    pub adc_channels: u8,
    /// N2HET timers
    pub het: u8,
    /// Channels per N2HET
    pub het_channels: u8,
    /// eQEP decoders
    pub eqep: u8,
    /// MibSPI modules
    pub mibspi: u8,
    /// Chip selects per MibSPI
    pub mibspi_chip_selects: u8,
    /// Standard SPI modules
    pub spi: u8,
    /// SCI modules
    pub sci: u8,
    /// Whether SCI supports LIN mode
    pub sci_lin: bool,
    /// I2C controllers
    pub i2c: u8,
    /// GPIO lines that can raise interrupts
    pub gpio_interrupts: u8,
}

impl ChipProfile {
    /// Profile of the board's safety MCU.
    ///
    /// Program flash is recorded exactly as the vendor header declares it
    /// (`128 * 2014`), which is slightly under 128 KiB.
    pub const SAFETY_MCU: Self = Self {
        core: CpuCore::CortexR5F,
        program_flash: 128 * 2014,
        sram: 32 * 1024,
        data_flash: 16 * 1024,
        can: 2,
        adc: 1,
        adc_channels: 16,
        het: 1,
        het_channels: 19,
        eqep: 1,
        mibspi: 1,
        mibspi_chip_selects: 4,
        spi: 2,
        sci: 1,
        sci_lin: true,
        i2c: 0,
        gpio_interrupts: 8,
    };

    /// Whether the chip has an FPU.
    pub const fn has_fpu(&self) -> bool {
        matches!(self.core, CpuCore::CortexR4F | CpuCore::CortexR5F)
    }

    /// Total SPI-capable modules (MibSPI + standard SPI).
    pub const fn spi_ports(&self) -> u8 {
        self.mibspi.saturating_add(self.spi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockRegisters;
    use crate::retry::RetryPolicy;

    #[test]
    fn modify_preserves_unmasked_bits() {
        let mut regs = MockRegisters::new();
        regs.write32(0xFFF7_F400, 0xAAAA_0000);
        regs.modify32(0xFFF7_F400, 0x0000_00FF, 0x1234_5678);
        assert_eq!(regs.read32(0xFFF7_F400), 0xAAAA_0078);
    }

    #[test]
    fn poll_succeeds_immediately_when_bits_match() {
        let mut regs = MockRegisters::new();
        regs.write32(0x100, 0x1);
        assert_eq!(regs.poll32(0x100, 0x1, 0x1, RetryPolicy::immediate(3)), Ok(0));
    }

    #[test]
    fn poll_gives_up_after_budget() {
        let regs = MockRegisters::new();
        let err = regs.poll32(0x100, 0x1, 0x1, RetryPolicy::immediate(3));
        assert_eq!(err, Err(crate::retry::RetryExhausted { attempts: 3 }));
        // initial read plus one per retry
        assert_eq!(regs.read_count(0x100), 4);
    }

    #[test]
    fn safety_mcu_profile() {
        let chip = ChipProfile::SAFETY_MCU;
        assert!(chip.has_fpu());
        assert_eq!(chip.spi_ports(), 3);
        assert_eq!(chip.program_flash, 257_792);
        assert_eq!(chip.i2c, 0);
    }
}
