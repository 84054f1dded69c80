//! GPIO abstraction layer
//!
//! Only the lines the audio decoder needs. The reset line is a plain
//! [`embedded_hal::digital::OutputPin`]; the data-request line gets its own
//! trait because the driver needs both a level read and control over the
//! edge interrupt that feeds the worker.

/// Edge that fires the ready interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptMode {
    /// Trigger on rising edge
    RisingEdge,
    /// Trigger on falling edge
    FallingEdge,
    /// Trigger on both edges
    BothEdges,
}

/// Device "ready for more data" line (VS1053 DREQ).
///
/// `is_ready` is a level read and is the only thing the byte pump trusts.
/// The interrupt is edge-triggered and only used to wake the worker; the
/// handler itself lives in the board layer and forwards to the codec's
/// interrupt relay.
pub trait ReadySignal {
    /// Edge the board should arm when [`enable_interrupt`](Self::enable_interrupt)
    /// is called.
    const TRIGGER: InterruptMode = InterruptMode::RisingEdge;

    /// Whether the device can accept at least one more 32-byte block.
    fn is_ready(&mut self) -> bool;

    /// Arm the transition-to-ready interrupt.
    fn enable_interrupt(&mut self);

    /// Mask the transition-to-ready interrupt.
    fn disable_interrupt(&mut self);
}

impl<T: ReadySignal + ?Sized> ReadySignal for &mut T {
    const TRIGGER: InterruptMode = T::TRIGGER;

    fn is_ready(&mut self) -> bool {
        T::is_ready(self)
    }

    fn enable_interrupt(&mut self) {
        T::enable_interrupt(self);
    }

    fn disable_interrupt(&mut self) {
        T::disable_interrupt(self);
    }
}
