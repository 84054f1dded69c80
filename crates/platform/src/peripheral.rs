//! Peripheral abstraction layer
//!
//! Trait-based view of the shared SPI bus the audio decoder sits on. The bus
//! is owned by the board layer and may carry other devices, so the driver
//! locks it around every transaction group and drives the chip selects
//! itself instead of relying on a per-transfer `SpiDevice`.

/// Chip-select lines of the audio decoder.
///
/// The decoder exposes two SPI ports on one bus: a command port for 16-bit
/// register transactions and a data port for the encoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipSelect {
    /// Register (command) port, XCS
    Control,
    /// Stream data port, XDCS
    Data,
}

impl ChipSelect {
    /// Short name for log output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Data => "data",
        }
    }
}

/// Lockable SPI bus shared between several devices.
///
/// `lock` must be called before any other method and paired with `unlock`.
/// Only one chip select may be asserted at a time.
pub trait SharedSpiBus {
    /// Error type
    type Error: core::fmt::Debug;

    /// Acquire exclusive ownership of the bus.
    async fn lock(&mut self) -> Result<(), Self::Error>;

    /// Release ownership taken by [`lock`](Self::lock).
    fn unlock(&mut self);

    /// Configure SPI mode and frequency
    fn configure(&mut self, config: SpiConfig) -> Result<(), Self::Error>;

    /// Assert (`true`) or release (`false`) a chip select line.
    fn select(&mut self, device: ChipSelect, selected: bool) -> Result<(), Self::Error>;

    /// Exchange one byte (full duplex).
    async fn transfer_byte(&mut self, byte: u8) -> Result<u8, Self::Error>;

    /// Send a block of bytes, discarding whatever is clocked in.
    async fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

/// SPI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
    /// SPI mode (CPOL, CPHA)
    pub mode: SpiMode,
    /// Bit order
    pub bit_order: BitOrder,
}

impl SpiConfig {
    /// Mode 0, MSB first, 8-bit words at `frequency` Hz.
    pub const fn mode0(frequency: u32) -> Self {
        Self {
            frequency,
            mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

/// SPI modes (CPOL, CPHA)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiMode {
    /// Mode 0: CPOL=0, CPHA=0
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

/// Bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit first
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}
