//! Simulated VS1053 for host-side testing
//!
//! [`MockVs1053`] is a shared decoder model with three handles that plug into
//! [`Vs1053`]: [`SimBus`] (SPI bus with control and data chip selects),
//! [`SimReady`] (DREQ) and [`SimReset`] (reset line). A [`SimDelay`] keeps
//! track of the time the driver waited.
//!
//! The model decodes SCI frames into a register file, buffers SDI bytes in a
//! FIFO of configurable size, asserts DREQ while 32 bytes fit, and clears
//! SM_CANCEL once a configurable number of stream bytes followed it. It
//! counts protocol violations (double lock, register traffic faster than
//! CLKI / 7, both chip selects active, data sent while DREQ was low) so tests
//! can assert there were none.
//!
//! Always compiled so integration tests and downstream crates can use it.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::convert::Infallible;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use platform::{ChipSelect, ReadySignal, SharedSpiBus, SpiConfig};

use crate::config::{CodecConfig, BLOCK_SIZE};
use crate::error::CodecError;
use crate::stream::{AudioBuffer, AudioCallback, BufferId, InterruptRelay};
use crate::vs1053::registers::{
    OPCODE_READ, OPCODE_WRITE, PARAM_END_FILL_BYTE, SCI_CLOCKF, SCI_MODE, SCI_STATUS, SCI_WRAM,
    SCI_WRAMADDR, SC_MULT_SHIFT, SM_CANCEL, SM_RESET, SM_SDINEW, SS_VER_SHIFT, SS_VER_VS1053,
};
use crate::vs1053::Vs1053;

/// CLKI multiplier in tenths for each SC_MULT value.
const MULT_TENTHS: [u32; 8] = [10, 20, 25, 30, 35, 40, 45, 50];

/// One bus transaction seen by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    /// SCI read frame
    RegisterRead {
        /// Register address
        register: u8,
        /// Value returned
        value: u16,
    },
    /// SCI write frame
    RegisterWrite {
        /// Register address
        register: u8,
        /// Value written
        value: u16,
    },
    /// SDI write
    DataBlock {
        /// Bytes in the write
        len: usize,
    },
    /// Rising edge on the reset line
    HardReset,
}

/// Error returned by [`SimBus`] while a fault is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimBusError;

/// The decoder state behind every handle.
#[derive(Debug)]
pub struct DecoderModel {
    registers: [u16; 16],
    version: u8,
    xtali_hz: u32,
    end_fill_byte: u8,
    wram_addr: u16,

    locked: bool,
    frequency: u32,
    control_selected: bool,
    data_selected: bool,
    frame: Vec<u8>,
    read_value: u16,

    fifo_capacity: Option<usize>,
    fifo_used: usize,
    dreq_override: Option<bool>,
    reset_high: bool,
    irq_enabled: bool,

    cancel_ack_after: Option<usize>,
    bytes_since_cancel: usize,

    bus_fault: bool,

    data: Vec<u8>,
    events: Vec<BusEvent>,
    soft_resets: u32,
    hard_resets: u32,
    fill_byte_reads: u32,
    double_locks: u32,
    unlocked_access: u32,
    sci_overspeed: u32,
    select_conflicts: u32,
    overruns: u32,
    irq_enables: u32,
    elapsed_ns: u64,
}

impl DecoderModel {
    fn new() -> Self {
        let mut model = Self {
            registers: [0; 16],
            version: SS_VER_VS1053,
            xtali_hz: CodecConfig::NOMINAL_XTALI_HZ,
            end_fill_byte: 0,
            wram_addr: 0,
            locked: false,
            frequency: 0,
            control_selected: false,
            data_selected: false,
            frame: Vec::new(),
            read_value: 0,
            fifo_capacity: None,
            fifo_used: 0,
            dreq_override: None,
            reset_high: true,
            irq_enabled: false,
            cancel_ack_after: Some(BLOCK_SIZE),
            bytes_since_cancel: 0,
            bus_fault: false,
            data: Vec::new(),
            events: Vec::new(),
            soft_resets: 0,
            hard_resets: 0,
            fill_byte_reads: 0,
            double_locks: 0,
            unlocked_access: 0,
            sci_overspeed: 0,
            select_conflicts: 0,
            overruns: 0,
            irq_enables: 0,
            elapsed_ns: 0,
        };
        model.power_on();
        model
    }

    fn power_on(&mut self) {
        self.registers = [0; 16];
        self.set_register(SCI_MODE, SM_SDINEW);
        self.set_register(SCI_STATUS, u16::from(self.version) << SS_VER_SHIFT);
        self.fifo_used = 0;
        self.bytes_since_cancel = 0;
    }

    fn register(&self, register: u8) -> u16 {
        self.registers
            .get(usize::from(register))
            .copied()
            .unwrap_or(0)
    }

    fn set_register(&mut self, register: u8, value: u16) {
        if let Some(slot) = self.registers.get_mut(usize::from(register)) {
            *slot = value;
        }
    }

    /// CLKI from the programmed SC_MULT field.
    fn chip_hz(&self) -> u32 {
        let mult = usize::from(self.register(SCI_CLOCKF) >> SC_MULT_SHIFT);
        let tenths = MULT_TENTHS.get(mult).copied().unwrap_or(10);
        (self.xtali_hz / 10).saturating_mul(tenths)
    }

    fn fifo_free(&self) -> usize {
        match self.fifo_capacity {
            Some(capacity) => capacity.saturating_sub(self.fifo_used),
            None => usize::MAX,
        }
    }

    fn dreq(&self) -> bool {
        match self.dreq_override {
            Some(level) => level,
            None => self.reset_high && self.fifo_free() >= BLOCK_SIZE,
        }
    }

    fn check_access(&mut self) -> Result<(), SimBusError> {
        if !self.locked {
            self.unlocked_access = self.unlocked_access.saturating_add(1);
        }
        if self.bus_fault {
            Err(SimBusError)
        } else {
            Ok(())
        }
    }

    /// Shift one SCI byte in, return the byte shifted out.
    fn sci_byte(&mut self, byte: u8) -> u8 {
        if self.frame.is_empty() && self.frequency > self.chip_hz() / 7 {
            self.sci_overspeed = self.sci_overspeed.saturating_add(1);
        }
        self.frame.push(byte);
        match self.frame.as_slice() {
            [OPCODE_READ, register] => {
                let register = *register;
                self.read_value = self.read(register);
                0
            }
            [OPCODE_READ, _, _] => self.read_value.to_be_bytes()[0],
            [OPCODE_READ, register, _, _] => {
                let register = *register;
                let value = self.read_value;
                self.events.push(BusEvent::RegisterRead { register, value });
                self.frame.clear();
                value.to_be_bytes()[1]
            }
            [OPCODE_WRITE, register, high, low] => {
                let (register, value) = (*register, u16::from_be_bytes([*high, *low]));
                self.frame.clear();
                self.write(register, value);
                0
            }
            _ => 0,
        }
    }

    fn read(&mut self, register: u8) -> u16 {
        match register {
            SCI_MODE => {
                let mode = self.register(SCI_MODE);
                let acked = self
                    .cancel_ack_after
                    .is_some_and(|after| self.bytes_since_cancel >= after);
                if mode & SM_CANCEL != 0 && acked {
                    self.set_register(SCI_MODE, mode & !SM_CANCEL);
                }
                self.register(SCI_MODE)
            }
            SCI_WRAM if self.wram_addr == PARAM_END_FILL_BYTE => {
                self.fill_byte_reads = self.fill_byte_reads.saturating_add(1);
                u16::from(self.end_fill_byte) << 8
            }
            other => self.register(other),
        }
    }

    fn write(&mut self, register: u8, value: u16) {
        self.events.push(BusEvent::RegisterWrite { register, value });
        match register {
            SCI_MODE => {
                let previous = self.register(SCI_MODE);
                if value & SM_RESET != 0 {
                    self.soft_resets = self.soft_resets.saturating_add(1);
                    self.fifo_used = 0;
                    // Self-clearing; SM_CANCEL is dropped with the decoder state.
                    self.set_register(SCI_MODE, value & !(SM_RESET | SM_CANCEL));
                    return;
                }
                if value & SM_CANCEL != 0 && previous & SM_CANCEL == 0 {
                    self.bytes_since_cancel = 0;
                }
                self.set_register(SCI_MODE, value);
            }
            SCI_STATUS => {}
            SCI_WRAMADDR => self.wram_addr = value,
            other => self.set_register(other, value),
        }
    }

    fn data_write(&mut self, data: &[u8]) {
        if !self.dreq() || data.len() > self.fifo_free() {
            self.overruns = self.overruns.saturating_add(1);
        }
        self.fifo_used = self.fifo_used.saturating_add(data.len());
        if self.register(SCI_MODE) & SM_CANCEL != 0 {
            self.bytes_since_cancel = self.bytes_since_cancel.saturating_add(data.len());
        }
        self.data.extend_from_slice(data);
        self.events.push(BusEvent::DataBlock { len: data.len() });
    }
}

/// Shared handle to a simulated VS1053.
#[derive(Clone)]
pub struct MockVs1053 {
    model: Rc<RefCell<DecoderModel>>,
}

impl MockVs1053 {
    /// Powered-on decoder with an unlimited FIFO that acknowledges a cancel
    /// after one block.
    pub fn new() -> Self {
        Self {
            model: Rc::new(RefCell::new(DecoderModel::new())),
        }
    }

    /// SPI bus handle
    pub fn bus(&self) -> SimBus {
        SimBus {
            model: Rc::clone(&self.model),
        }
    }

    /// DREQ handle
    pub fn ready(&self) -> SimReady {
        SimReady {
            model: Rc::clone(&self.model),
        }
    }

    /// Reset line handle
    pub fn reset(&self) -> SimReset {
        SimReset {
            model: Rc::clone(&self.model),
        }
    }

    /// Delay handle
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            model: Rc::clone(&self.model),
        }
    }

    /// Driver wired to this decoder.
    pub fn driver(&self, config: CodecConfig) -> Vs1053<SimBus, SimReady, SimReset, SimDelay> {
        Vs1053::new(self.bus(), self.ready(), self.reset(), self.delay(), config)
    }

    /// Inspect the model.
    pub fn with<R>(&self, f: impl FnOnce(&DecoderModel) -> R) -> R {
        f(&self.model.borrow())
    }

    fn update<R>(&self, f: impl FnOnce(&mut DecoderModel) -> R) -> R {
        f(&mut self.model.borrow_mut())
    }

    // ── Fault and timing knobs ───────────────────────────────────────────────

    /// SS_VER reported in STATUS from the next reset on (and now).
    pub fn set_version(&self, version: u8) {
        self.update(|m| {
            m.version = version;
            m.set_register(SCI_STATUS, u16::from(version) << SS_VER_SHIFT);
        });
    }

    /// Byte stored at X memory 0x1E06.
    pub fn set_end_fill_byte(&self, byte: u8) {
        self.update(|m| m.end_fill_byte = byte);
    }

    /// Finite FIFO of `bytes`; `None` never fills.
    pub fn set_fifo_capacity(&self, bytes: Option<usize>) {
        self.update(|m| m.fifo_capacity = bytes);
    }

    /// Decode `bytes` out of the FIFO, freeing room.
    pub fn play(&self, bytes: usize) {
        self.update(|m| m.fifo_used = m.fifo_used.saturating_sub(bytes));
    }

    /// Stream bytes after which SM_CANCEL clears; `None` never clears.
    pub fn set_cancel_ack_after(&self, bytes: Option<usize>) {
        self.update(|m| m.cancel_ack_after = bytes);
    }

    /// Force DREQ to a level; `None` follows the FIFO again.
    pub fn force_dreq(&self, level: Option<bool>) {
        self.update(|m| m.dreq_override = level);
    }

    /// Make every transfer fail.
    pub fn set_bus_fault(&self, fault: bool) {
        self.update(|m| m.bus_fault = fault);
    }

    /// Deliver a DREQ edge the way the board's interrupt handler would:
    /// only while the interrupt is armed and the line is high.
    pub fn dreq_edge<M: RawMutex>(&self, relay: &InterruptRelay<'_, M>) -> bool {
        let fire = self.with(|m| m.irq_enabled && m.dreq());
        fire && relay.on_ready_edge()
    }

    // ── Observations ─────────────────────────────────────────────────────────

    /// Current value of an SCI register.
    pub fn register(&self, register: u8) -> u16 {
        self.with(|m| m.register(register))
    }

    /// Every stream byte received, in order.
    pub fn data(&self) -> Vec<u8> {
        self.with(|m| m.data.clone())
    }

    /// Size of every SDI write, in order.
    pub fn data_blocks(&self) -> Vec<usize> {
        self.with(|m| {
            m.events
                .iter()
                .filter_map(|e| match e {
                    BusEvent::DataBlock { len } => Some(*len),
                    _ => None,
                })
                .collect()
        })
    }

    /// Every bus event, in order.
    pub fn events(&self) -> Vec<BusEvent> {
        self.with(|m| m.events.clone())
    }

    /// SCI writes to `register`, in order.
    pub fn writes_to(&self, register: u8) -> Vec<u16> {
        self.with(|m| {
            m.events
                .iter()
                .filter_map(|e| match e {
                    BusEvent::RegisterWrite { register: r, value } if *r == register => {
                        Some(*value)
                    }
                    _ => None,
                })
                .collect()
        })
    }

    /// Bytes waiting in the FIFO
    pub fn fifo_used(&self) -> usize {
        self.with(|m| m.fifo_used)
    }

    /// Whether DREQ is high
    pub fn dreq(&self) -> bool {
        self.with(DecoderModel::dreq)
    }

    /// SM_RESET requests seen
    pub fn soft_resets(&self) -> u32 {
        self.with(|m| m.soft_resets)
    }

    /// Reset line rising edges seen
    pub fn hard_resets(&self) -> u32 {
        self.with(|m| m.hard_resets)
    }

    /// Reads of the end-fill byte parameter
    pub fn fill_byte_reads(&self) -> u32 {
        self.with(|m| m.fill_byte_reads)
    }

    /// Whether the bus lock is held
    pub fn is_locked(&self) -> bool {
        self.with(|m| m.locked)
    }

    /// Whether the DREQ interrupt is armed
    pub fn irq_enabled(&self) -> bool {
        self.with(|m| m.irq_enabled)
    }

    /// Times the DREQ interrupt was armed
    pub fn irq_enables(&self) -> u32 {
        self.with(|m| m.irq_enables)
    }

    /// Lock taken while already held
    pub fn double_locks(&self) -> u32 {
        self.with(|m| m.double_locks)
    }

    /// Transfers without the lock
    pub fn unlocked_access(&self) -> u32 {
        self.with(|m| m.unlocked_access)
    }

    /// SCI frames clocked faster than CLKI / 7
    pub fn sci_overspeed(&self) -> u32 {
        self.with(|m| m.sci_overspeed)
    }

    /// Both chip selects asserted at once
    pub fn select_conflicts(&self) -> u32 {
        self.with(|m| m.select_conflicts)
    }

    /// SDI writes while DREQ was low or the FIFO was too full
    pub fn overruns(&self) -> u32 {
        self.with(|m| m.overruns)
    }

    /// Total time spent in [`SimDelay`], in microseconds.
    pub fn elapsed_us(&self) -> u64 {
        self.with(|m| m.elapsed_ns / 1_000)
    }
}

impl Default for MockVs1053 {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus handle of a [`MockVs1053`].
pub struct SimBus {
    model: Rc<RefCell<DecoderModel>>,
}

impl SharedSpiBus for SimBus {
    type Error = SimBusError;

    async fn lock(&mut self) -> Result<(), SimBusError> {
        let mut m = self.model.borrow_mut();
        if m.locked {
            m.double_locks = m.double_locks.saturating_add(1);
        }
        m.locked = true;
        Ok(())
    }

    fn unlock(&mut self) {
        self.model.borrow_mut().locked = false;
    }

    fn configure(&mut self, config: SpiConfig) -> Result<(), SimBusError> {
        let mut m = self.model.borrow_mut();
        m.check_access()?;
        m.frequency = config.frequency;
        Ok(())
    }

    fn select(&mut self, device: ChipSelect, selected: bool) -> Result<(), SimBusError> {
        let mut m = self.model.borrow_mut();
        m.check_access()?;
        match device {
            ChipSelect::Control => {
                m.control_selected = selected;
                m.frame.clear();
            }
            ChipSelect::Data => m.data_selected = selected,
        }
        if m.control_selected && m.data_selected {
            m.select_conflicts = m.select_conflicts.saturating_add(1);
        }
        Ok(())
    }

    async fn transfer_byte(&mut self, byte: u8) -> Result<u8, SimBusError> {
        let mut m = self.model.borrow_mut();
        m.check_access()?;
        if m.control_selected {
            Ok(m.sci_byte(byte))
        } else {
            if m.data_selected {
                m.data_write(&[byte]);
            }
            Ok(0xFF)
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SimBusError> {
        let mut m = self.model.borrow_mut();
        m.check_access()?;
        if m.control_selected {
            for byte in data {
                m.sci_byte(*byte);
            }
        } else if m.data_selected {
            m.data_write(data);
        }
        Ok(())
    }
}

/// DREQ handle of a [`MockVs1053`].
pub struct SimReady {
    model: Rc<RefCell<DecoderModel>>,
}

impl ReadySignal for SimReady {
    fn is_ready(&mut self) -> bool {
        self.model.borrow().dreq()
    }

    fn enable_interrupt(&mut self) {
        let mut m = self.model.borrow_mut();
        m.irq_enabled = true;
        m.irq_enables = m.irq_enables.saturating_add(1);
    }

    fn disable_interrupt(&mut self) {
        self.model.borrow_mut().irq_enabled = false;
    }
}

/// Reset line handle of a [`MockVs1053`].
pub struct SimReset {
    model: Rc<RefCell<DecoderModel>>,
}

impl ErrorType for SimReset {
    type Error = Infallible;
}

impl OutputPin for SimReset {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.model.borrow_mut().reset_high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut m = self.model.borrow_mut();
        if !m.reset_high {
            m.reset_high = true;
            m.hard_resets = m.hard_resets.saturating_add(1);
            m.events.push(BusEvent::HardReset);
            m.power_on();
        }
        Ok(())
    }
}

/// Delay handle of a [`MockVs1053`]. Returns at once and adds up the time.
pub struct SimDelay {
    model: Rc<RefCell<DecoderModel>>,
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        let mut m = self.model.borrow_mut();
        m.elapsed_ns = m.elapsed_ns.saturating_add(u64::from(ns));
    }
}

/// [`AudioCallback`] that records what the worker reported.
#[derive(Debug, Default)]
pub struct CallbackLog {
    /// Buffers sent in full, in order
    pub dequeued: Vec<BufferId>,
    /// Buffers released unplayed, in order
    pub discarded: Vec<BufferId>,
    /// `stream_complete` calls
    pub completions: u32,
    /// Reported errors, in order
    pub errors: Vec<CodecError>,
}

impl CallbackLog {
    /// Every buffer handed back, played or not.
    pub fn returned(&self) -> usize {
        self.dequeued.len().saturating_add(self.discarded.len())
    }
}

impl AudioCallback for CallbackLog {
    fn buffer_dequeued(&mut self, buffer: AudioBuffer) {
        self.dequeued.push(buffer.id());
    }

    fn buffer_discarded(&mut self, buffer: AudioBuffer) {
        self.discarded.push(buffer.id());
    }

    fn stream_complete(&mut self) {
        self.completions = self.completions.saturating_add(1);
    }

    fn io_error(&mut self, error: CodecError) {
        self.errors.push(error);
    }
}
