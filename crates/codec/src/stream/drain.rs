//! End-of-stream drain accounting
//!
//! # Protocol
//!
//! After the last byte of a stream the decoder still holds undecoded data in
//! its FIFO. To flush it:
//!
//! 1. Send the end-fill byte (read once from X memory 0x1E06) in 32-byte
//!    blocks until at least 2052 bytes have gone out.
//! 2. Set SM_CANCEL.
//! 3. Keep sending fill blocks, reading SCI_MODE after each, until the
//!    decoder clears SM_CANCEL. Then request a software reset.
//! 4. If SM_CANCEL is still set at the ceiling, the decoder is wedged: pulse
//!    the reset line.
//!
//! A stop request has already set SM_CANCEL before the stream ran out, so it
//! starts at step 3 with a full poll budget.
//!
//! # This Module
//!
//! [`DrainTracker`] only counts. It tells the engine what to do after each
//! fill block and each cancel poll; the engine does the bus I/O. Keeping the
//! counting free of I/O lets the block arithmetic be tested on its own.

use platform::RetryBudget;

use crate::config::{CANCEL_ACK_POLICY, MIN_FILL_BLOCKS};

// ─── Phases ──────────────────────────────────────────────────────────────────

/// Where a drain is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DrainPhase {
    /// Sending the minimum fill before SM_CANCEL may be set.
    Flush {
        /// Fill blocks sent in this phase
        blocks_sent: u16,
    },
    /// SM_CANCEL is set; polling for the decoder to clear it.
    AwaitCancel {
        /// Polls left before the hardware reset fallback
        budget: RetryBudget,
    },
}

/// Next step for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DrainAction {
    /// Send another fill block.
    SendFill,
    /// Write SCI_MODE with SM_CANCEL, then keep filling.
    RequestCancel,
    /// Read SCI_MODE and report whether SM_CANCEL has cleared.
    PollCancel,
    /// Cancel acknowledged: request SM_RESET and go idle.
    SoftReset,
    /// Ceiling reached without acknowledge: pulse the reset line and go idle.
    HardReset,
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

/// Fill-block counter for one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrainTracker {
    phase: DrainPhase,
    fill_blocks: u16,
}

impl DrainTracker {
    /// Drain after a natural end of stream: full flush first.
    pub fn new() -> Self {
        Self {
            phase: DrainPhase::Flush { blocks_sent: 0 },
            fill_blocks: 0,
        }
    }

    /// Drain after SM_CANCEL was already set by a stop request.
    pub fn after_cancel() -> Self {
        Self {
            phase: DrainPhase::AwaitCancel {
                budget: CANCEL_ACK_POLICY.budget(),
            },
            fill_blocks: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> DrainPhase {
        self.phase
    }

    /// Fill blocks sent during this drain
    pub fn fill_blocks(&self) -> u16 {
        self.fill_blocks
    }

    /// Record one fill block on the bus.
    pub fn on_block_sent(&mut self) -> DrainAction {
        self.fill_blocks = self.fill_blocks.saturating_add(1);
        match &mut self.phase {
            DrainPhase::Flush { blocks_sent } => {
                *blocks_sent = blocks_sent.saturating_add(1);
                if *blocks_sent >= MIN_FILL_BLOCKS {
                    self.phase = DrainPhase::AwaitCancel {
                        budget: CANCEL_ACK_POLICY.budget(),
                    };
                    DrainAction::RequestCancel
                } else {
                    DrainAction::SendFill
                }
            }
            DrainPhase::AwaitCancel { .. } => DrainAction::PollCancel,
        }
    }

    /// Record the result of a SCI_MODE poll.
    pub fn on_cancel_poll(&mut self, acknowledged: bool) -> DrainAction {
        if acknowledged {
            return DrainAction::SoftReset;
        }
        match &mut self.phase {
            DrainPhase::AwaitCancel { budget } => {
                if budget.try_consume() {
                    DrainAction::SendFill
                } else {
                    DrainAction::HardReset
                }
            }
            // Polls only happen after the flush; treat a stray one as a no-op.
            DrainPhase::Flush { .. } => DrainAction::SendFill,
        }
    }
}

impl Default for DrainTracker {
    fn default() -> Self {
        Self::new()
    }
}
