//! VS1053 driver module (VLSI Solution)
//!
//! The chip has two SPI ports sharing one bus: SCI for 16-bit registers
//! (control chip select) and SDI for the compressed stream (data chip
//! select). DREQ high means the 2048-byte FIFO can take at least 32 bytes.

mod driver;
pub mod registers;
pub mod volume;

pub use driver::{clockf_value, Vs1053};

/// A volume or tone change.
///
/// Volume and balance use a 0..=1000 scale (balance 500 is centred). Bass
/// and treble are 0..=100 percent. Values above range are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeatureRequest {
    /// Master volume
    Volume(u16),
    /// Left/right balance
    Balance(u16),
    /// Bass enhancer level
    Bass(u8),
    /// Treble control level
    Treble(u8),
    /// Stereo extender. Accepted and ignored.
    StereoExtender {
        /// Requested on/off state
        enable: bool,
    },
}

impl FeatureRequest {
    /// Short name for log output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Volume(_) => "volume",
            Self::Balance(_) => "balance",
            Self::Bass(_) => "bass",
            Self::Treble(_) => "treble",
            Self::StereoExtender { .. } => "stereo extender",
        }
    }
}

/// Device-specific control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoctlRequest {
    /// Pulse the reset line and restore the power-on clock.
    HardwareReset,
    /// Report the preferred upper-half buffer geometry.
    BufferInfo,
}

/// Answers to [`IoctlRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoctlResponse {
    /// Request carried out
    Done,
    /// Preferred buffer geometry
    BufferInfo {
        /// Bytes per buffer
        buffer_size: u32,
        /// Number of buffers
        buffer_count: u16,
    },
}
