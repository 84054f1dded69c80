//! Byte pump and drain driver
//!
//! [`FeedEngine`] holds everything the worker owns for one stream: the
//! driver borrow, the active buffer, the feed state and the drain tracker.
//! [`FeedEngine::pump`] moves bytes while DREQ is high; the message loop
//! around it lives in the worker module.
//!
//! # Pump
//!
//! ```text
//!   Streaming ──final buffer sent──▶ Draining(flush) ──65 blocks──▶ SM_CANCEL
//!       │                                                            │
//!     Stop: SM_CANCEL                                                ▼
//!       ▼                                  Draining(await cancel): poll MODE
//!   CancelPending ──ack / out of data──▶ Draining(await cancel)     │
//!                                               ack ─▶ SM_RESET ─▶ Idle
//!                                   block 130, no ack ─▶ reset pin ─▶ Idle
//! ```
//!
//! Every block is at most 32 bytes and only goes out after DREQ was seen
//! high, so the decoder FIFO never overflows.

use core::ops::ControlFlow;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use platform::{ReadySignal, SharedSpiBus};

use super::buffer::AudioBuffer;
use super::drain::{DrainAction, DrainTracker};
use super::state::FeedState;
use super::{AudioCallback, FeedShared};
use crate::config::BLOCK_SIZE;
use crate::error::CodecError;
use crate::vs1053::registers::{PARAM_END_FILL_BYTE, SM_CANCEL, SM_RESET};
use crate::vs1053::Vs1053;

/// Worker-side state of one stream.
///
/// Created by [`Vs1053::start`]; consumed by [`FeedEngine::run`].
pub struct FeedEngine<'a, BUS, DREQ, RST, DELAY, M: RawMutex, C> {
    pub(super) dev: &'a mut Vs1053<BUS, DREQ, RST, DELAY>,
    pub(super) shared: &'a FeedShared<M>,
    pub(super) callback: C,
    pub(super) state: FeedState,
    /// State to go back to on resume.
    pub(super) resume_to: FeedState,
    pub(super) active: Option<AudioBuffer>,
    drain: DrainTracker,
    fill_byte: Option<u8>,
    /// SM_CANCEL has been written for this stream.
    pub(super) cancel_requested: bool,
    /// The stream ends because of a stop request.
    pub(super) stop_requested: bool,
}

impl<'a, BUS, DREQ, RST, DELAY, M, C> FeedEngine<'a, BUS, DREQ, RST, DELAY, M, C>
where
    BUS: SharedSpiBus,
    DREQ: ReadySignal,
    RST: OutputPin,
    DELAY: DelayNs,
    M: RawMutex,
    C: AudioCallback,
{
    pub(crate) fn new(
        dev: &'a mut Vs1053<BUS, DREQ, RST, DELAY>,
        shared: &'a FeedShared<M>,
        callback: C,
        first: AudioBuffer,
    ) -> Self {
        Self {
            dev,
            shared,
            callback,
            state: FeedState::Streaming,
            resume_to: FeedState::Streaming,
            active: Some(first),
            drain: DrainTracker::new(),
            fill_byte: None,
            cancel_requested: false,
            stop_requested: false,
        }
    }

    /// Current feed state
    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Fill byte read from the decoder, once known.
    pub fn fill_byte(&self) -> Option<u8> {
        self.fill_byte
    }

    /// Send as much as the decoder will take right now.
    ///
    /// Returns at once without touching the bus when paused, idle, or DREQ
    /// is low. The bus lock is released on every path.
    pub async fn pump(&mut self) -> Result<(), CodecError> {
        if !self.state.is_pumping() || !self.dev.is_ready() {
            return Ok(());
        }
        let mut late_drain = false;
        if self.active.is_none() && self.state != FeedState::Draining {
            match self.shared.queue.dequeue().await? {
                Some(buffer) => self.active = Some(buffer),
                // Cancel pending and nothing left to cut short: the lookup
                // that should have started the drain did not get through.
                None if self.state == FeedState::CancelPending => late_drain = true,
                None => return Ok(()),
            }
        }

        let data_hz = self.dev.config().data_spi_hz;
        self.dev.lock_bus(data_hz).await?;
        let result = self.pump_locked(late_drain).await;
        let released = self.dev.select_data(false);
        self.dev.unlock_bus();
        result.and(released)
    }

    async fn pump_locked(&mut self, late_drain: bool) -> Result<(), CodecError> {
        self.dev.select_data(true)?;
        if late_drain {
            self.enter_drain(DrainTracker::after_cancel()).await?;
        }
        while self.dev.is_ready() {
            let flow = match self.state {
                FeedState::Streaming | FeedState::CancelPending => self.stream_block().await?,
                FeedState::Draining => self.drain_block().await?,
                FeedState::Idle | FeedState::Paused => ControlFlow::Break(()),
            };
            if flow.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// One block from the active buffer, then buffer bookkeeping.
    async fn stream_block(&mut self) -> Result<ControlFlow<()>, CodecError> {
        let Some(buffer) = self.active.as_mut() else {
            return Ok(ControlFlow::Break(()));
        };

        let block = buffer.next_block(BLOCK_SIZE);
        let sent = block.len();
        if sent > 0 {
            self.dev.write_data(block).await?;
        }
        buffer.advance(sent);

        let mut acknowledged = false;
        let mut cut_short = false;
        if self.state == FeedState::CancelPending {
            self.dev.leave_data_port()?;
            let pending = self.dev.cancel_pending().await;
            self.dev.enter_data_port()?;
            if !pending? {
                debug!("cancel acknowledged at byte {}", buffer.cursor());
                acknowledged = true;
                cut_short = !buffer.is_exhausted();
                buffer.truncate();
            }
        }

        if !buffer.is_exhausted() {
            return Ok(ControlFlow::Continue(()));
        }
        let Some(done) = self.active.take() else {
            return Ok(ControlFlow::Break(()));
        };

        if acknowledged {
            if cut_short {
                self.callback.buffer_discarded(done);
            } else {
                self.callback.buffer_dequeued(done);
            }
            self.enter_drain(DrainTracker::after_cancel()).await?;
            return Ok(ControlFlow::Continue(()));
        }

        if done.is_final() {
            debug!("final buffer {} sent", done.id().0);
            self.callback.buffer_dequeued(done);
            let tracker = if self.cancel_requested {
                DrainTracker::after_cancel()
            } else {
                DrainTracker::new()
            };
            self.enter_drain(tracker).await?;
            return Ok(ControlFlow::Continue(()));
        }

        self.callback.buffer_dequeued(done);
        match self.shared.queue.dequeue().await? {
            Some(next) => {
                self.active = Some(next);
                Ok(ControlFlow::Continue(()))
            }
            None if self.state == FeedState::CancelPending => {
                self.enter_drain(DrainTracker::after_cancel()).await?;
                Ok(ControlFlow::Continue(()))
            }
            None => {
                trace!("underrun, waiting for enqueue");
                Ok(ControlFlow::Break(()))
            }
        }
    }

    /// Switch to fill bytes. The end-fill byte is read on first use.
    async fn enter_drain(&mut self, tracker: DrainTracker) -> Result<(), CodecError> {
        if self.fill_byte.is_none() {
            self.dev.leave_data_port()?;
            let word = self.dev.read_memory(PARAM_END_FILL_BYTE).await;
            self.dev.enter_data_port()?;
            let [fill, _] = word?.to_be_bytes();
            self.fill_byte = Some(fill);
        }
        debug!("draining ({})", if self.cancel_requested { "cancel" } else { "flush" });
        self.drain = tracker;
        self.state = FeedState::Draining;
        Ok(())
    }

    /// One fill block, then whatever the tracker asks for.
    async fn drain_block(&mut self) -> Result<ControlFlow<()>, CodecError> {
        let fill = [self.fill_byte.unwrap_or(0); BLOCK_SIZE];
        self.dev.write_data(&fill).await?;

        let mut action = self.drain.on_block_sent();
        loop {
            match action {
                DrainAction::SendFill => return Ok(ControlFlow::Continue(())),
                DrainAction::RequestCancel => {
                    self.dev.leave_data_port()?;
                    self.dev.set_mode_bits(SM_CANCEL).await?;
                    self.dev.enter_data_port()?;
                    self.cancel_requested = true;
                    return Ok(ControlFlow::Continue(()));
                }
                DrainAction::PollCancel => {
                    self.dev.leave_data_port()?;
                    let pending = self.dev.cancel_pending().await?;
                    self.dev.enter_data_port()?;
                    action = self.drain.on_cancel_poll(!pending);
                }
                DrainAction::SoftReset => {
                    self.dev.leave_data_port()?;
                    self.dev.set_mode_bits(SM_RESET).await?;
                    info!("stream drained after {} fill blocks", self.drain.fill_blocks());
                    self.state = FeedState::Idle;
                    return Ok(ControlFlow::Break(()));
                }
                DrainAction::HardReset => {
                    warn!(
                        "SM_CANCEL never cleared after {} fill blocks, resetting decoder",
                        self.drain.fill_blocks()
                    );
                    self.dev.select_data(false)?;
                    self.dev.hard_reset_locked().await?;
                    self.state = FeedState::Idle;
                    return Ok(ControlFlow::Break(()));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CodecConfig;
    use crate::mock::{CallbackLog, MockVs1053};
    use crate::stream::BufferId;
    use alloc::vec;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    #[allow(clippy::cast_possible_truncation)]
    fn payload(len: usize) -> alloc::vec::Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn low_dreq_leaves_bus_alone() {
        let chip = MockVs1053::new();
        let mut dev = chip.driver(CodecConfig::DEFAULT);
        let shared = FeedShared::<CriticalSectionRawMutex>::new();
        shared
            .queue()
            .enqueue(AudioBuffer::full(BufferId(0), payload(64)))
            .await
            .unwrap();
        let mut log = CallbackLog::default();
        let mut engine = dev.start(&shared, &mut log).await.unwrap();
        let before = chip.events().len();

        chip.force_dreq(Some(false));
        engine.pump().await.unwrap();
        assert_eq!(chip.events().len(), before);
        assert!(!chip.is_locked());
    }

    #[tokio::test]
    async fn pump_stops_when_fifo_fills() {
        let chip = MockVs1053::new();
        chip.set_fifo_capacity(Some(96));
        let mut dev = chip.driver(CodecConfig::DEFAULT);
        let shared = FeedShared::<CriticalSectionRawMutex>::new();
        shared
            .queue()
            .enqueue(AudioBuffer::full(BufferId(0), payload(256)))
            .await
            .unwrap();
        let mut log = CallbackLog::default();
        let mut engine = dev.start(&shared, &mut log).await.unwrap();

        engine.pump().await.unwrap();
        assert_eq!(chip.data_blocks(), vec![32, 32, 32]);
        assert_eq!(chip.overruns(), 0);
        assert!(!chip.is_locked());

        chip.play(64);
        engine.pump().await.unwrap();
        assert_eq!(chip.data().len(), 160);
        assert_eq!(engine.state(), FeedState::Streaming);
    }

    #[tokio::test]
    async fn final_buffer_reads_fill_byte_and_drains() {
        let chip = MockVs1053::new();
        chip.set_end_fill_byte(0xA5);
        let mut dev = chip.driver(CodecConfig::DEFAULT);
        let shared = FeedShared::<CriticalSectionRawMutex>::new();
        shared
            .queue()
            .enqueue(AudioBuffer::new(BufferId(7), payload(40), 64))
            .await
            .unwrap();
        let mut log = CallbackLog::default();
        {
            let mut engine = dev.start(&shared, &mut log).await.unwrap();
            engine.pump().await.unwrap();
            assert_eq!(engine.fill_byte(), Some(0xA5));
            assert_eq!(engine.state(), FeedState::Idle);
        }
        assert_eq!(log.dequeued, vec![BufferId(7)]);
        assert_eq!(chip.fill_byte_reads(), 1);
        assert_eq!(chip.soft_resets(), 2); // start + drain
        assert!(chip.data().iter().skip(40).all(|b| *b == 0xA5));
        assert_eq!(chip.select_conflicts(), 0);
        assert_eq!(chip.sci_overspeed(), 0);
    }

    #[tokio::test]
    async fn underrun_keeps_streaming() {
        let chip = MockVs1053::new();
        let mut dev = chip.driver(CodecConfig::DEFAULT);
        let shared = FeedShared::<CriticalSectionRawMutex>::new();
        shared
            .queue()
            .enqueue(AudioBuffer::full(BufferId(1), payload(64)))
            .await
            .unwrap();
        let mut log = CallbackLog::default();
        let mut engine = dev.start(&shared, &mut log).await.unwrap();
        engine.pump().await.unwrap();
        assert_eq!(engine.state(), FeedState::Streaming);
        assert!(engine.active.is_none());

        // Nothing queued: no lock, no traffic.
        let before = chip.events().len();
        engine.pump().await.unwrap();
        assert_eq!(chip.events().len(), before);
    }

    #[tokio::test]
    async fn cancel_drain_survives_busy_queue() {
        let chip = MockVs1053::new();
        chip.set_cancel_ack_after(Some(128));
        let mut dev = chip.driver(CodecConfig::DEFAULT);
        let shared = FeedShared::<CriticalSectionRawMutex>::with_lock_timeout(
            embassy_time::Duration::from_millis(5),
        );
        shared
            .queue()
            .enqueue(AudioBuffer::full(BufferId(0), payload(64)))
            .await
            .unwrap();
        let mut log = CallbackLog::default();
        {
            let mut engine = dev.start(&shared, &mut log).await.unwrap();
            engine.dev.lock_control().await.unwrap();
            engine.dev.set_mode_bits(SM_CANCEL).await.unwrap();
            engine.dev.unlock_bus();
            engine.cancel_requested = true;
            engine.state = FeedState::CancelPending;

            // The buffer goes out, then the lookup for the next one fails.
            let guard = shared.queue.buffers.lock().await;
            assert_eq!(engine.pump().await, Err(CodecError::QueueLock));
            drop(guard);
            assert!(engine.active.is_none());
            assert_eq!(engine.state(), FeedState::CancelPending);
            assert!(!chip.is_locked());

            engine.pump().await.unwrap();
            assert_eq!(engine.state(), FeedState::Idle);
        }
        assert_eq!(log.dequeued, vec![BufferId(0)]);
        assert_eq!(chip.hard_resets(), 0);
        assert_eq!(chip.soft_resets(), 2);
        assert_eq!(chip.fill_byte_reads(), 1);
        assert_eq!(chip.select_conflicts(), 0);
    }

    #[tokio::test]
    async fn paused_engine_does_not_pump() {
        let chip = MockVs1053::new();
        let mut dev = chip.driver(CodecConfig::DEFAULT);
        let shared = FeedShared::<CriticalSectionRawMutex>::new();
        shared
            .queue()
            .enqueue(AudioBuffer::full(BufferId(1), payload(64)))
            .await
            .unwrap();
        let mut log = CallbackLog::default();
        let mut engine = dev.start(&shared, &mut log).await.unwrap();
        engine.state = FeedState::Paused;
        engine.pump().await.unwrap();
        assert!(chip.data().is_empty());
    }
}
