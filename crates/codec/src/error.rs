//! Driver error type

/// Errors reported by the VS1053 driver and its feed engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// SPI bus transfer, lock or configuration failed
    Bus,
    /// Reset line could not be driven
    Gpio,
    /// STATUS reported a chip version other than VS1053
    NotDetected {
        /// SS_VER field read from the device
        version: u8,
    },
    /// DREQ did not assert, or a self-clearing bit did not clear, in time
    NotResponding,
    /// Requested chip clock is above what CLOCKF can express
    InvalidFrequency {
        /// Requested clock in Hz
        hz: u32,
    },
    /// No buffer was enqueued before the start timeout
    NoBuffer,
    /// The buffer queue lock could not be taken in time
    QueueLock,
    /// Operation needs a running stream
    NotRunning,
    /// Configuration values are out of range
    InvalidConfig,
}

impl CodecError {
    /// Short name for log output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bus => "bus",
            Self::Gpio => "gpio",
            Self::NotDetected { .. } => "not detected",
            Self::NotResponding => "not responding",
            Self::InvalidFrequency { .. } => "invalid frequency",
            Self::NoBuffer => "no buffer",
            Self::QueueLock => "queue lock",
            Self::NotRunning => "not running",
            Self::InvalidConfig => "invalid config",
        }
    }
}

impl core::fmt::Display for CodecError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus => write!(f, "SPI bus error"),
            Self::Gpio => write!(f, "reset line error"),
            Self::NotDetected { version } => {
                write!(f, "VS1053 not detected (chip version {version})")
            }
            Self::NotResponding => write!(f, "decoder not responding"),
            Self::InvalidFrequency { hz } => write!(f, "unsupported decoder clock {hz} Hz"),
            Self::NoBuffer => write!(f, "no audio buffer enqueued before start timeout"),
            Self::QueueLock => write!(f, "buffer queue lock timed out"),
            Self::NotRunning => write!(f, "no stream running"),
            Self::InvalidConfig => write!(f, "invalid codec configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CodecError {}

impl From<platform::RetryExhausted> for CodecError {
    fn from(_: platform::RetryExhausted) -> Self {
        Self::NotResponding
    }
}
