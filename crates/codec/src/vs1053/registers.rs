//! VS1053 register map
//!
//! Source: VLSI Solution VS1053b Datasheet v1.31, section 9.6 (SCI
//! registers) and section 10.5 (extra parameters in X memory).
//!
//! # Serial Control Interface (SCI)
//!
//! Each transaction is four bytes on the control chip select:
//!
//! ```text
//! read:   0x03  addr  [MSB out] [LSB out]
//! write:  0x02  addr   MSB       LSB
//! ```
//!
//! DREQ drops while the chip processes a write; the driver waits a short
//! settle time after every write instead of watching DREQ, since DREQ is
//! also the stream-data handshake.
//!
//! # Cancelling playback
//!
//! Setting SM_CANCEL asks the decoder to stop at the next frame boundary.
//! The chip clears the bit once it has done so. Data (or fill bytes) must
//! keep flowing while the bit is set or it never clears.

// ---------------------------------------------------------------------------
// SCI opcodes
// ---------------------------------------------------------------------------

/// SCI read opcode
pub const OPCODE_READ: u8 = 0x03;

/// SCI write opcode
pub const OPCODE_WRITE: u8 = 0x02;

/// Byte clocked out while reading
pub const DUMMY: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Register addresses
// ---------------------------------------------------------------------------

/// Mode control
pub const SCI_MODE: u8 = 0x00;

/// Status (chip version in bits \[7:4\])
pub const SCI_STATUS: u8 = 0x01;

/// Built-in bass/treble enhancer
pub const SCI_BASS: u8 = 0x02;

/// Clock frequency and multiplier
pub const SCI_CLOCKF: u8 = 0x03;

/// Decode time in seconds
pub const SCI_DECODE_TIME: u8 = 0x04;

/// Misc. audio data (sample rate, channels)
pub const SCI_AUDATA: u8 = 0x05;

/// RAM read/write data
pub const SCI_WRAM: u8 = 0x06;

/// RAM read/write base address
pub const SCI_WRAMADDR: u8 = 0x07;

/// Stream header data 0
pub const SCI_HDAT0: u8 = 0x08;

/// Stream header data 1 (format identifier)
pub const SCI_HDAT1: u8 = 0x09;

/// Start address of application
pub const SCI_AIADDR: u8 = 0x0A;

/// Volume control: left attenuation in MSB, right in LSB, 0.5 dB steps
pub const SCI_VOL: u8 = 0x0B;

/// Application control register 0
pub const SCI_AICTRL0: u8 = 0x0C;

/// Application control register 3
pub const SCI_AICTRL3: u8 = 0x0F;

// ---------------------------------------------------------------------------
// SCI_MODE bits
// ---------------------------------------------------------------------------

/// Differential output
pub const SM_DIFF: u16 = 1 << 0;

/// Software reset (self-clearing)
pub const SM_RESET: u16 = 1 << 2;

/// Cancel decoding current file (cleared by the chip when done)
pub const SM_CANCEL: u16 = 1 << 3;

/// Stream mode
pub const SM_STREAM: u16 = 1 << 6;

/// Native SPI mode (power-on default)
pub const SM_SDINEW: u16 = 1 << 11;

// ---------------------------------------------------------------------------
// SCI_STATUS fields
// ---------------------------------------------------------------------------

/// Chip version mask
pub const SS_VER_MASK: u16 = 0x00F0;

/// Chip version shift
pub const SS_VER_SHIFT: u16 = 4;

/// SS_VER value of a VS1053
pub const SS_VER_VS1053: u8 = 4;

// ---------------------------------------------------------------------------
// SCI_CLOCKF fields
// ---------------------------------------------------------------------------

/// Clock multiplier field shift (bits \[15:13\])
pub const SC_MULT_SHIFT: u16 = 13;

/// Allowed multiplier addition field shift (bits \[12:11\])
pub const SC_ADD_SHIFT: u16 = 11;

/// SC_ADD: up to XTALI × 2.0 extra when the decoder needs it
pub const SC_ADD_XTALI_X20: u16 = 3;

/// SC_FREQ: crystal correction in 4 kHz steps above 8 MHz (bits \[10:0\])
pub const SC_FREQ_MASK: u16 = 0x07FF;

/// Base frequency of the SC_FREQ field
pub const SC_FREQ_BASE_HZ: u32 = 8_000_000;

/// Step of the SC_FREQ field
pub const SC_FREQ_STEP_HZ: u32 = 4_000;

// ---------------------------------------------------------------------------
// SCI_BASS fields
// ---------------------------------------------------------------------------

/// Treble boost shift (bits \[15:12\], 1.5 dB steps)
pub const ST_AMPLITUDE_SHIFT: u16 = 12;

/// Treble lower limit frequency shift (bits \[11:8\], 1 kHz steps)
pub const ST_FREQLIMIT_SHIFT: u16 = 8;

/// Bass boost shift (bits \[7:4\], 1 dB steps)
pub const SB_AMPLITUDE_SHIFT: u16 = 4;

/// Treble lower limit used by the driver (15 kHz)
pub const TREBLE_FREQLIMIT: u16 = 15;

/// Bass upper limit used by the driver (150 Hz)
pub const BASS_FREQLIMIT: u16 = 15;

// ---------------------------------------------------------------------------
// X-memory parameters (via SCI_WRAMADDR / SCI_WRAM)
// ---------------------------------------------------------------------------

/// Address of the end-fill byte parameter
pub const PARAM_END_FILL_BYTE: u16 = 0x1E06;

// ---------------------------------------------------------------------------
// SCI_VOL values
// ---------------------------------------------------------------------------

/// Both channels fully attenuated and analog drivers powered down
pub const VOL_POWER_DOWN: u16 = 0xFEFE;

/// Name of a register for log output.
pub const fn name(register: u8) -> &'static str {
    match register {
        SCI_MODE => "MODE",
        SCI_STATUS => "STATUS",
        SCI_BASS => "BASS",
        SCI_CLOCKF => "CLOCKF",
        SCI_DECODE_TIME => "DECODE_TIME",
        SCI_AUDATA => "AUDATA",
        SCI_WRAM => "WRAM",
        SCI_WRAMADDR => "WRAMADDR",
        SCI_HDAT0 => "HDAT0",
        SCI_HDAT1 => "HDAT1",
        SCI_AIADDR => "AIADDR",
        SCI_VOL => "VOL",
        SCI_AICTRL0..=SCI_AICTRL3 => "AICTRL",
        _ => "?",
    }
}
