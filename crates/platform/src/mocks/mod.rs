//! Mock implementations for testing
//!
//! Host-side stand-ins for the board seam so register-level code can be
//! exercised without silicon.

#![cfg(any(test, feature = "std"))]

use core::cell::RefCell;

use crate::board::{BoardBringUp, RegisterInterface};
use crate::gpio::ReadySignal;

const MAX_REGISTERS: usize = 64;

#[derive(Clone, Copy)]
struct Slot {
    address: u32,
    value: u32,
    reads: u32,
}

/// Sparse register file. Unwritten addresses read as zero.
pub struct MockRegisters {
    slots: RefCell<heapless::Vec<Slot, MAX_REGISTERS>>,
}

impl MockRegisters {
    /// Create an empty register file
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(heapless::Vec::new()),
        }
    }

    /// How many times `address` has been read
    pub fn read_count(&self, address: u32) -> u32 {
        self.slots
            .borrow()
            .iter()
            .find(|slot| slot.address == address)
            .map_or(0, |slot| slot.reads)
    }

    fn slot_mut<R>(&self, address: u32, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
        let mut slots = self.slots.borrow_mut();
        if !slots.iter().any(|slot| slot.address == address) {
            // Full register file: silently ignore, tests never touch 64 addresses
            let _ = slots.push(Slot {
                address,
                value: 0,
                reads: 0,
            });
        }
        slots.iter_mut().find(|slot| slot.address == address).map(f)
    }
}

impl Default for MockRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterInterface for MockRegisters {
    fn read32(&self, address: u32) -> u32 {
        self.slot_mut(address, |slot| {
            slot.reads = slot.reads.saturating_add(1);
            slot.value
        })
        .unwrap_or(0)
    }

    fn write32(&mut self, address: u32, value: u32) {
        let _ = self.slot_mut(address, |slot| slot.value = value);
    }
}

/// Bring-up routine that only counts invocations
#[derive(Debug, Default)]
pub struct MockBringUp {
    calls: u32,
}

impl MockBringUp {
    /// Number of `bring_up` calls so far
    pub fn calls(&self) -> u32 {
        self.calls
    }
}

impl BoardBringUp for MockBringUp {
    fn bring_up(&mut self) {
        self.calls = self.calls.saturating_add(1);
    }
}

/// Ready line with a settable level
#[derive(Debug, Default)]
pub struct MockReadySignal {
    /// Current level of the line
    pub level: bool,
    /// Whether the edge interrupt is armed
    pub interrupt_enabled: bool,
    /// Number of level reads
    pub polls: u32,
}

impl ReadySignal for MockReadySignal {
    fn is_ready(&mut self) -> bool {
        self.polls = self.polls.saturating_add(1);
        self.level
    }

    fn enable_interrupt(&mut self) {
        self.interrupt_enabled = true;
    }

    fn disable_interrupt(&mut self) {
        self.interrupt_enabled = false;
    }
}
