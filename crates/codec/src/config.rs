//! Codec configuration and constants
//!
//! # Clock chain
//!
//! ```text
//! XTALI 12.288 MHz ──CLOCKF (SC_MULT, SC_ADD)──▶ CLKI
//!   CLKI = 12.288 MHz after reset / shutdown
//!   CLKI = 43 MHz while decoding (XTALI × 3.5, +2.0× headroom for WMA/AAC)
//! SCI (register) SPI clock  ≤ CLKI / 7
//! SDI (data) SPI clock       = 20 MHz while streaming
//! ```
//!
//! # Drain accounting
//!
//! End of stream is flushed with fill bytes in 32-byte blocks. The decoder
//! needs at least 2052 fill bytes before SM_CANCEL may be set, which rounds
//! up to 65 blocks. Twice that is the ceiling after which the chip is hard
//! reset.

use embassy_time::Duration;
use platform::RetryPolicy;

use crate::error::CodecError;

/// Bytes the decoder guarantees to accept for each DREQ assertion.
pub const BLOCK_SIZE: usize = 32;

/// Worker inbox depth (data requests, control messages).
pub const INBOX_DEPTH: usize = 16;

/// Fill blocks sent before SM_CANCEL is requested (65 × 32 = 2080 ≥ 2052).
pub const MIN_FILL_BLOCKS: u16 = 65;

/// Fill blocks after which the decoder is considered wedged.
pub const DRAIN_CEILING_BLOCKS: u16 = 130;

/// Cancel-acknowledge polls available once SM_CANCEL is set.
///
/// The block that fails its poll with the budget spent is the ceiling block,
/// so early and late phases together never exceed [`DRAIN_CEILING_BLOCKS`].
pub const CANCEL_ACK_POLICY: RetryPolicy =
    RetryPolicy::immediate(DRAIN_CEILING_BLOCKS - MIN_FILL_BLOCKS - 1);

/// DREQ wait after a CLOCKF write: 200 × 1 ms.
pub const CLOCK_SETTLE_POLICY: RetryPolicy = RetryPolicy::new(200, 1_000);

/// DREQ wait after the power-on reset pulse: 200 × 10 µs.
pub const RESET_SETTLE_POLICY: RetryPolicy = RetryPolicy::new(200, 10);

/// SM_RESET self-clear poll during a soft reset.
pub const SOFT_RESET_POLICY: RetryPolicy = RetryPolicy::immediate(1_000);

/// Bound on taking the buffer queue lock.
pub const QUEUE_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Settle time after every SCI register write.
pub const REGISTER_WRITE_SETTLE_US: u32 = 10;

/// Width of the hardware reset pulse.
pub const RESET_PULSE_US: u32 = 10;

/// Recovery time after the reset line is released.
pub const RESET_RECOVERY_US: u32 = 2_000;

/// Wait before cancelling when DREQ is low at stop time.
pub const STOP_DREQ_GRACE_US: u32 = 300;

/// Pause after a stop has dropped the chip clock.
pub const STOP_SETTLE_MS: u32 = 40;

/// VS1053 board configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecConfig {
    /// Crystal frequency on XTALI in Hz.
    pub xtali_hz: u32,
    /// Chip clock while decoding in Hz.
    pub decode_hz: u32,
    /// SPI clock for the stream data port in Hz.
    pub data_spi_hz: u32,
    /// Size of one upper-half audio buffer in bytes.
    pub buffer_size: u32,
    /// Number of upper-half audio buffers.
    pub buffer_count: u16,
    /// How long `start` waits for the first buffer, in milliseconds.
    pub start_timeout_ms: u32,
}

impl CodecConfig {
    /// Reference board: 12.288 MHz crystal, 43 MHz decode clock, 20 MHz SDI.
    pub const DEFAULT: Self = Self {
        xtali_hz: 12_288_000,
        decode_hz: 43_000_000,
        data_spi_hz: 20_000_000,
        buffer_size: 8192,
        buffer_count: 2,
        start_timeout_ms: 1_000,
    };

    /// Crystal frequency the CLOCKF frequency-correction field is relative to.
    pub const NOMINAL_XTALI_HZ: u32 = 12_288_000;

    /// Check ranges the hardware can express.
    ///
    /// The crystal must be within what SC_FREQ can correct (8..=12.288 MHz +
    /// 11 bits of 4 kHz steps), the decode clock must be at least the crystal,
    /// and buffers must hold at least one block.
    pub fn validate(&self) -> Result<(), CodecError> {
        let xtali_ok = (8_000_000..=16_188_000).contains(&self.xtali_hz);
        let decode_ok = self.decode_hz >= self.xtali_hz;
        let spi_ok = self.data_spi_hz > 0;
        let buffers_ok = self.buffer_size as usize >= BLOCK_SIZE && self.buffer_count > 0;
        if xtali_ok && decode_ok && spi_ok && buffers_ok {
            Ok(())
        } else {
            Err(CodecError::InvalidConfig)
        }
    }

    /// First-buffer wait as an embassy duration.
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.start_timeout_ms))
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
