//! VS1053 lower-half driver
//!
//! Owns the SPI bus handle, the DREQ line, the reset line and a delay
//! provider. All register traffic goes through [`Vs1053::read_register`] /
//! [`Vs1053::write_register`], which expect the caller to hold the bus lock.
//!
//! # Bus speed
//!
//! SCI (register) transfers must not exceed CLKI / 7. The driver tracks the
//! chip clock it last programmed and locks the bus at the matching speed.
//! SDI (stream data) runs at [`CodecConfig::data_spi_hz`] while decoding.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use platform::{ChipSelect, ReadySignal, RetryPolicy, SharedSpiBus, SpiConfig};

use super::registers::{
    self, DUMMY, OPCODE_READ, OPCODE_WRITE, SCI_BASS, SCI_CLOCKF, SCI_HDAT0, SCI_HDAT1, SCI_MODE,
    SCI_STATUS, SCI_VOL, SCI_WRAM, SCI_WRAMADDR, SC_ADD_SHIFT, SC_ADD_XTALI_X20, SC_FREQ_BASE_HZ,
    SC_FREQ_MASK, SC_FREQ_STEP_HZ, SC_MULT_SHIFT, SM_CANCEL, SM_RESET, SS_VER_MASK, SS_VER_SHIFT,
    SS_VER_VS1053, VOL_POWER_DOWN,
};
use super::volume::{self, BALANCE_CENTER, DEFAULT_VOLUME, SCALE_MAX, TONE_MAX};
use super::{FeatureRequest, IoctlRequest, IoctlResponse};
use crate::config::{
    CodecConfig, CLOCK_SETTLE_POLICY, REGISTER_WRITE_SETTLE_US, RESET_PULSE_US,
    RESET_RECOVERY_US, RESET_SETTLE_POLICY, SOFT_RESET_POLICY,
};
use crate::error::CodecError;
use crate::stream::{AudioCallback, FeedEngine, FeedShared};

/// Highest CLOCKF multiplier in tenths (×5.0).
const MAX_CLOCK_FACTOR: u64 = 50;

/// Lowest CLOCKF multiplier in tenths (×1.0).
const MIN_CLOCK_FACTOR: u64 = 10;

fn bus_error<E: core::fmt::Debug>(_: E) -> CodecError {
    CodecError::Bus
}

/// CLOCKF value that brings CLKI closest to `target_hz`.
///
/// The multiplier is rounded to the nearest 0.5 step the chip offers
/// (×1.0, ×2.0 … ×5.0) and SC_ADD is always ×2.0 for WMA/AAC headroom.
/// Crystals other than 12.288 MHz get the SC_FREQ correction field.
pub fn clockf_value(xtali_hz: u32, target_hz: u32) -> Result<u16, CodecError> {
    let invalid = CodecError::InvalidFrequency { hz: target_hz };
    let xtali = u64::from(xtali_hz);
    let factor = u64::from(target_hz)
        .saturating_mul(10)
        .saturating_add(xtali / 2)
        .checked_div(xtali)
        .ok_or(invalid)?;
    if factor > MAX_CLOCK_FACTOR {
        return Err(invalid);
    }

    // ×1.0 and ×1.5 both program SC_MULT = 0.
    let mult = factor.max(MIN_CLOCK_FACTOR).saturating_sub(15) / 5;
    #[allow(clippy::cast_possible_truncation)] // mult ≤ 7
    let mut value = (mult as u16) << SC_MULT_SHIFT | SC_ADD_XTALI_X20 << SC_ADD_SHIFT;

    if xtali_hz != CodecConfig::NOMINAL_XTALI_HZ {
        let correction = xtali_hz.saturating_sub(SC_FREQ_BASE_HZ) / SC_FREQ_STEP_HZ;
        #[allow(clippy::cast_possible_truncation)] // masked to 11 bits
        let correction = correction as u16 & SC_FREQ_MASK;
        value |= correction;
    }
    Ok(value)
}

/// VS1053 driver.
pub struct Vs1053<BUS, DREQ, RST, DELAY> {
    bus: BUS,
    dreq: DREQ,
    rst: RST,
    delay: DELAY,
    config: CodecConfig,
    chip_hz: u32,
    control_spi_hz: u32,
    volume: u16,
    balance: u16,
    bass: u8,
    treble: u8,
}

impl<BUS, DREQ, RST, DELAY> Vs1053<BUS, DREQ, RST, DELAY>
where
    BUS: SharedSpiBus,
    DREQ: ReadySignal,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Wrap the board resources. No bus traffic until [`initialize`](Self::initialize).
    pub fn new(bus: BUS, dreq: DREQ, rst: RST, delay: DELAY, config: CodecConfig) -> Self {
        Self {
            bus,
            dreq,
            rst,
            delay,
            config,
            chip_hz: config.xtali_hz,
            control_spi_hz: config.xtali_hz / 7,
            volume: DEFAULT_VOLUME,
            balance: BALANCE_CENTER,
            bass: 0,
            treble: 0,
        }
    }

    /// Give the board resources back.
    pub fn release(self) -> (BUS, DREQ, RST, DELAY) {
        (self.bus, self.dreq, self.rst, self.delay)
    }

    /// Board configuration
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Chip clock (CLKI) last programmed, in Hz.
    pub fn chip_frequency(&self) -> u32 {
        self.chip_hz
    }

    /// SCI bus speed that goes with the current chip clock.
    pub fn control_frequency(&self) -> u32 {
        self.control_spi_hz
    }

    /// Volume on the 0..=1000 scale
    pub fn volume(&self) -> u16 {
        self.volume
    }

    /// Balance on the 0..=1000 scale
    pub fn balance(&self) -> u16 {
        self.balance
    }

    /// Bass level in percent
    pub fn bass(&self) -> u8 {
        self.bass
    }

    /// Treble level in percent
    pub fn treble(&self) -> u8 {
        self.treble
    }

    // ── Bus session ──────────────────────────────────────────────────────────

    /// Lock the shared bus and clock it at `frequency`.
    pub(crate) async fn lock_bus(&mut self, frequency: u32) -> Result<(), CodecError> {
        self.bus.lock().await.map_err(bus_error)?;
        if let Err(e) = self.bus.configure(SpiConfig::mode0(frequency)) {
            self.bus.unlock();
            return Err(bus_error(e));
        }
        Ok(())
    }

    /// Lock the bus at register speed.
    pub(crate) async fn lock_control(&mut self) -> Result<(), CodecError> {
        self.lock_bus(self.control_spi_hz).await
    }

    pub(crate) fn unlock_bus(&mut self) {
        self.bus.unlock();
    }

    /// Select or release the stream data port. Caller holds the lock.
    pub(crate) fn select_data(&mut self, selected: bool) -> Result<(), CodecError> {
        self.bus
            .select(ChipSelect::Data, selected)
            .map_err(bus_error)
    }

    /// Send stream bytes on the data port. Caller has it selected.
    pub(crate) async fn write_data(&mut self, block: &[u8]) -> Result<(), CodecError> {
        self.bus.write(block).await.map_err(bus_error)
    }

    /// Step off the data port to talk to registers mid-stream.
    pub(crate) fn leave_data_port(&mut self) -> Result<(), CodecError> {
        self.select_data(false)?;
        self.bus
            .configure(SpiConfig::mode0(self.control_spi_hz))
            .map_err(bus_error)
    }

    /// Return to the data port after [`leave_data_port`](Self::leave_data_port).
    pub(crate) fn enter_data_port(&mut self) -> Result<(), CodecError> {
        self.bus
            .configure(SpiConfig::mode0(self.config.data_spi_hz))
            .map_err(bus_error)?;
        self.select_data(true)
    }

    // ── DREQ ─────────────────────────────────────────────────────────────────

    pub(crate) fn is_ready(&mut self) -> bool {
        self.dreq.is_ready()
    }

    pub(crate) fn enable_ready_interrupt(&mut self) {
        self.dreq.enable_interrupt();
    }

    pub(crate) fn disable_ready_interrupt(&mut self) {
        self.dreq.disable_interrupt();
    }

    async fn wait_ready(&mut self, policy: RetryPolicy) -> Result<u16, CodecError> {
        let dreq = &mut self.dreq;
        policy
            .poll_until(&mut self.delay, || dreq.is_ready())
            .await
            .map_err(|e| {
                warn!("DREQ stayed low after {} polls", e.attempts);
                CodecError::from(e)
            })
    }

    pub(crate) async fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us).await;
    }

    pub(crate) async fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }

    // ── SCI registers ────────────────────────────────────────────────────────

    async fn read_frame(&mut self, register: u8) -> Result<u16, BUS::Error> {
        self.bus.transfer_byte(OPCODE_READ).await?;
        self.bus.transfer_byte(register).await?;
        let high = self.bus.transfer_byte(DUMMY).await?;
        let low = self.bus.transfer_byte(DUMMY).await?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Read a 16-bit SCI register. Caller holds the lock at register speed.
    pub async fn read_register(&mut self, register: u8) -> Result<u16, CodecError> {
        self.bus
            .select(ChipSelect::Control, true)
            .map_err(bus_error)?;
        let frame = self.read_frame(register).await;
        let released = self.bus.select(ChipSelect::Control, false);
        let value = frame.map_err(bus_error)?;
        released.map_err(bus_error)?;
        trace!("SCI {} -> {:#x}", registers::name(register), value);
        Ok(value)
    }

    /// Write a 16-bit SCI register. Caller holds the lock at register speed.
    pub async fn write_register(&mut self, register: u8, value: u16) -> Result<(), CodecError> {
        let [high, low] = value.to_be_bytes();
        self.bus
            .select(ChipSelect::Control, true)
            .map_err(bus_error)?;
        let frame = self.bus.write(&[OPCODE_WRITE, register, high, low]).await;
        let released = self.bus.select(ChipSelect::Control, false);
        frame.map_err(bus_error)?;
        released.map_err(bus_error)?;
        trace!("SCI {} <- {:#x}", registers::name(register), value);
        self.delay.delay_us(REGISTER_WRITE_SETTLE_US).await;
        Ok(())
    }

    /// Set bits in SCI_MODE, keeping the others. Caller holds the lock.
    pub(crate) async fn set_mode_bits(&mut self, bits: u16) -> Result<(), CodecError> {
        let mode = self.read_register(SCI_MODE).await?;
        self.write_register(SCI_MODE, mode | bits).await
    }

    /// Whether the decoder still has SM_CANCEL set. Caller holds the lock.
    pub(crate) async fn cancel_pending(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_register(SCI_MODE).await? & SM_CANCEL != 0)
    }

    /// Read a word from X/Y data memory. Caller holds the lock.
    pub(crate) async fn read_memory(&mut self, address: u16) -> Result<u16, CodecError> {
        self.write_register(SCI_WRAMADDR, address).await?;
        self.read_register(SCI_WRAM).await
    }

    // ── Clocking ─────────────────────────────────────────────────────────────

    /// Program CLKI and wait for the PLL to settle. Caller holds the lock.
    ///
    /// The bus is re-clocked to the new register speed before returning.
    pub async fn set_clock(&mut self, frequency: u32) -> Result<(), CodecError> {
        let value = clockf_value(self.config.xtali_hz, frequency)?;
        self.write_register(SCI_CLOCKF, value).await?;
        self.wait_ready(CLOCK_SETTLE_POLICY).await?;

        self.chip_hz = frequency;
        self.control_spi_hz = frequency / 7;
        self.bus
            .configure(SpiConfig::mode0(self.control_spi_hz))
            .map_err(bus_error)?;
        debug!("CLKI {} Hz (CLOCKF {:#x})", frequency, value);
        Ok(())
    }

    // ── Resets ───────────────────────────────────────────────────────────────

    /// Software reset through SM_RESET, then back to the crystal clock.
    pub async fn soft_reset(&mut self) -> Result<(), CodecError> {
        self.disable_ready_interrupt();
        self.lock_control().await?;
        let result = self.soft_reset_locked().await;
        self.unlock_bus();
        result
    }

    async fn soft_reset_locked(&mut self) -> Result<(), CodecError> {
        self.set_mode_bits(SM_RESET).await?;
        let mut budget = SOFT_RESET_POLICY.budget();
        while self.read_register(SCI_MODE).await? & SM_RESET != 0 {
            if !budget.try_consume() {
                warn!("SM_RESET did not self-clear");
                return Err(CodecError::NotResponding);
            }
        }
        let xtali = self.config.xtali_hz;
        self.set_clock(xtali).await
    }

    /// Pulse the reset line. Registers are back at power-on values after.
    pub(crate) async fn pulse_reset(&mut self) -> Result<(), CodecError> {
        self.rst.set_low().map_err(|_| CodecError::Gpio)?;
        self.delay.delay_us(RESET_PULSE_US).await;
        self.rst.set_high().map_err(|_| CodecError::Gpio)?;
        self.delay.delay_us(RESET_RECOVERY_US).await;
        Ok(())
    }

    /// Hardware reset with the bus already locked: pulse, then restore the
    /// crystal clock.
    pub(crate) async fn hard_reset_locked(&mut self) -> Result<(), CodecError> {
        self.pulse_reset().await?;
        let xtali = self.config.xtali_hz;
        self.chip_hz = xtali;
        self.control_spi_hz = xtali / 7;
        self.bus
            .configure(SpiConfig::mode0(self.control_spi_hz))
            .map_err(bus_error)?;
        self.set_clock(xtali).await
    }

    /// Hardware reset through the reset line.
    pub async fn hard_reset(&mut self) -> Result<(), CodecError> {
        info!("VS1053 hardware reset");
        self.disable_ready_interrupt();
        self.pulse_reset().await?;
        let xtali = self.config.xtali_hz;
        self.chip_hz = xtali;
        self.control_spi_hz = xtali / 7;
        self.lock_control().await?;
        let result = self.set_clock(xtali).await;
        self.unlock_bus();
        result
    }

    // ── Bring-up ─────────────────────────────────────────────────────────────

    /// Reset the chip, check it is a VS1053 and leave it powered down.
    pub async fn initialize(&mut self) -> Result<(), CodecError> {
        self.config.validate()?;
        self.disable_ready_interrupt();

        self.pulse_reset().await?;
        self.wait_ready(RESET_SETTLE_POLICY).await?;
        self.chip_hz = self.config.xtali_hz;
        self.control_spi_hz = self.config.xtali_hz / 7;

        self.lock_control().await?;
        let status = self.read_register(SCI_STATUS).await;
        self.unlock_bus();
        let status = status?;

        #[allow(clippy::cast_possible_truncation)] // 4-bit field
        let version = ((status & SS_VER_MASK) >> SS_VER_SHIFT) as u8;
        if version != SS_VER_VS1053 {
            error!("SS_VER {} is not a VS1053", version);
            return Err(CodecError::NotDetected { version });
        }
        info!("VS1053 detected");

        self.shutdown().await
    }

    /// Crystal clock and analog outputs powered down.
    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.lock_control().await?;
        let result = self.shutdown_locked().await;
        self.unlock_bus();
        result
    }

    async fn shutdown_locked(&mut self) -> Result<(), CodecError> {
        let xtali = self.config.xtali_hz;
        self.set_clock(xtali).await?;
        self.write_register(SCI_VOL, VOL_POWER_DOWN).await
    }

    // ── Upper-half requests ──────────────────────────────────────────────────

    /// Apply a volume or tone change.
    pub async fn configure(&mut self, request: FeatureRequest) -> Result<(), CodecError> {
        debug!("configure {}", request.as_str());
        match request {
            FeatureRequest::Volume(level) => {
                self.volume = level.min(SCALE_MAX);
                self.apply_volume().await
            }
            FeatureRequest::Balance(level) => {
                self.balance = level.min(SCALE_MAX);
                self.apply_volume().await
            }
            FeatureRequest::Bass(level) => {
                self.bass = level.min(TONE_MAX);
                self.apply_tone().await
            }
            FeatureRequest::Treble(level) => {
                self.treble = level.min(TONE_MAX);
                self.apply_tone().await
            }
            FeatureRequest::StereoExtender { .. } => Ok(()),
        }
    }

    async fn apply_volume(&mut self) -> Result<(), CodecError> {
        let value = volume::volume_register(self.volume, self.balance);
        self.write_locked(SCI_VOL, value).await
    }

    async fn apply_tone(&mut self) -> Result<(), CodecError> {
        let value = volume::bass_register(self.bass, self.treble);
        self.write_locked(SCI_BASS, value).await
    }

    async fn write_locked(&mut self, register: u8, value: u16) -> Result<(), CodecError> {
        self.lock_control().await?;
        let result = self.write_register(register, value).await;
        self.unlock_bus();
        result
    }

    /// Device-specific requests.
    pub async fn ioctl(&mut self, request: IoctlRequest) -> Result<IoctlResponse, CodecError> {
        match request {
            IoctlRequest::HardwareReset => {
                self.hard_reset().await?;
                Ok(IoctlResponse::Done)
            }
            IoctlRequest::BufferInfo => Ok(IoctlResponse::BufferInfo {
                buffer_size: self.config.buffer_size,
                buffer_count: self.config.buffer_count,
            }),
        }
    }

    /// Begin a stream.
    ///
    /// Resets the decoder, raises CLKI to the decode clock and waits up to
    /// [`CodecConfig::start_timeout_ms`] for the first buffer. The returned
    /// engine must be driven with [`FeedEngine::run`] on the worker task;
    /// the borrow of `self` ends when it returns.
    pub async fn start<'a, M, C>(
        &'a mut self,
        shared: &'a FeedShared<M>,
        callback: C,
    ) -> Result<FeedEngine<'a, BUS, DREQ, RST, DELAY, M, C>, CodecError>
    where
        M: RawMutex,
        C: AudioCallback,
    {
        self.lock_control().await?;
        let hdat = self.read_hdat().await;
        self.unlock_bus();
        let (hdat1, hdat0) = hdat?;
        debug!("start: HDAT1={:#x} HDAT0={:#x}", hdat1, hdat0);

        self.soft_reset().await?;

        self.lock_control().await?;
        let decode_hz = self.config.decode_hz;
        let result = self.set_clock(decode_hz).await;
        self.unlock_bus();
        result?;

        shared.reset_for_start();
        let first = match shared.queue.dequeue_wait(self.config.start_timeout()).await {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("start aborted: {}", e.as_str());
                if let Err(clock) = self.lower_clock().await {
                    warn!("CLKI not lowered: {}", clock.as_str());
                }
                return Err(e);
            }
        };
        info!("stream starting with buffer {}", first.id().0);
        Ok(FeedEngine::new(self, shared, callback, first))
    }

    /// Drop CLKI back to XTALI between streams.
    pub(crate) async fn lower_clock(&mut self) -> Result<(), CodecError> {
        self.lock_control().await?;
        let xtali = self.config.xtali_hz;
        let result = self.set_clock(xtali).await;
        self.unlock_bus();
        result
    }

    async fn read_hdat(&mut self) -> Result<(u16, u16), CodecError> {
        let hdat1 = self.read_register(SCI_HDAT1).await?;
        let hdat0 = self.read_register(SCI_HDAT0).await?;
        Ok((hdat1, hdat0))
    }
}
