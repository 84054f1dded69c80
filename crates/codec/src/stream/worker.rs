//! Worker message loop
//!
//! [`FeedEngine::run`] is the only code that writes [`FeedState`] or talks
//! to the decoder while a stream is running. It sleeps on the inbox and
//! reacts to one message at a time:
//!
//! | Message | Effect |
//! |---------|--------|
//! | `DataRequest` | pump |
//! | `Enqueue` | pump, if the active slot is empty |
//! | `Stop` | set SM_CANCEL, `CancelPending`, pump |
//! | `Pause` / `Resume` | mask / unmask DREQ, resume re-primes |
//! | `Configure` | volume or tone register write |
//! | `Shutdown` | leave without draining |
//!
//! The loop ends when the state reaches `Idle`.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use platform::{ReadySignal, SharedSpiBus};

use super::engine::FeedEngine;
use super::state::{FeedMessage, FeedState};
use super::AudioCallback;
use crate::config::{STOP_DREQ_GRACE_US, STOP_SETTLE_MS};
use crate::error::CodecError;
use crate::vs1053::registers::SM_CANCEL;

impl<BUS, DREQ, RST, DELAY, M, C> FeedEngine<'_, BUS, DREQ, RST, DELAY, M, C>
where
    BUS: SharedSpiBus,
    DREQ: ReadySignal,
    RST: OutputPin,
    DELAY: DelayNs,
    M: RawMutex,
    C: AudioCallback,
{
    /// Run the stream to the end and hand the callback back.
    ///
    /// Every buffer taken from the queue, and every buffer still queued when
    /// the stream ends, goes back through the callback exactly once.
    pub async fn run(mut self) -> C {
        self.shared.set_running(true);
        self.dev.enable_ready_interrupt();
        info!("feed worker started");

        self.pump_or_abort().await;
        while self.state != FeedState::Idle {
            let message = self.shared.inbox.receive().await;
            trace!("worker <- {} ({})", message.as_str(), self.state.as_str());
            match message {
                FeedMessage::DataRequest => self.pump_or_abort().await,
                FeedMessage::Enqueue => {
                    if self.active.is_none() {
                        self.pump_or_abort().await;
                    }
                }
                FeedMessage::Stop => self.stop().await,
                FeedMessage::Pause => self.pause(),
                FeedMessage::Resume => self.resume().await,
                FeedMessage::Configure(request) => {
                    if let Err(e) = self.dev.configure(request).await {
                        warn!("configure {} failed: {}", request.as_str(), e.as_str());
                        self.callback.io_error(e);
                    }
                }
                FeedMessage::Shutdown => {
                    debug!("inbox closed");
                    break;
                }
            }
        }

        self.finish().await
    }

    /// Pump, reporting failures. A busy queue only skips this pump; anything
    /// else ends the stream.
    async fn pump_or_abort(&mut self) {
        if let Err(e) = self.pump().await {
            self.callback.io_error(e);
            if e == CodecError::QueueLock {
                warn!("queue busy, pump skipped");
            } else {
                error!("stream aborted: {}", e.as_str());
                self.state = FeedState::Idle;
            }
        }
    }

    async fn stop(&mut self) {
        self.stop_requested = true;
        if self.state == FeedState::Paused {
            self.state = self.resume_to;
            self.dev.enable_ready_interrupt();
        }

        match self.state {
            FeedState::Streaming => {
                if self.active.is_none() {
                    // Buffers may be queued behind a low DREQ.
                    match self.shared.queue.dequeue().await {
                        Ok(Some(head)) => self.active = Some(head),
                        Ok(None) => {
                            debug!("stop with nothing in flight");
                            self.state = FeedState::Idle;
                            return;
                        }
                        Err(e) => {
                            self.callback.io_error(e);
                            self.state = FeedState::Idle;
                            return;
                        }
                    }
                }
                if let Err(e) = self.request_cancel().await {
                    error!("cancel request failed: {}", e.as_str());
                    self.callback.io_error(e);
                    self.state = FeedState::Idle;
                    return;
                }
                self.cancel_requested = true;
                self.state = FeedState::CancelPending;
                debug!("cancel pending");
                self.pump_or_abort().await;
            }
            FeedState::Idle
            | FeedState::CancelPending
            | FeedState::Draining
            | FeedState::Paused => {}
        }
    }

    /// Write SM_CANCEL with DREQ masked.
    async fn request_cancel(&mut self) -> Result<(), CodecError> {
        if !self.dev.is_ready() {
            self.dev.delay_us(STOP_DREQ_GRACE_US).await;
        }
        self.dev.disable_ready_interrupt();
        let result = match self.dev.lock_control().await {
            Ok(()) => {
                let written = self.dev.set_mode_bits(SM_CANCEL).await;
                self.dev.unlock_bus();
                written
            }
            Err(e) => Err(e),
        };
        self.dev.enable_ready_interrupt();
        result
    }

    fn pause(&mut self) {
        if self.state == FeedState::Paused {
            return;
        }
        self.resume_to = self.state;
        self.state = FeedState::Paused;
        self.dev.disable_ready_interrupt();
        debug!("paused in {}", self.resume_to.as_str());
    }

    async fn resume(&mut self) {
        if self.state != FeedState::Paused {
            return;
        }
        self.state = self.resume_to;
        self.dev.enable_ready_interrupt();
        debug!("resumed in {}", self.state.as_str());
        self.pump_or_abort().await;
    }

    /// Release everything and report the end of the stream.
    async fn finish(mut self) -> C {
        self.dev.disable_ready_interrupt();
        self.state = FeedState::Idle;

        match self.shared.queue.take_all().await {
            Ok(pending) => {
                for buffer in pending {
                    self.callback.buffer_discarded(buffer);
                }
            }
            Err(e) => self.callback.io_error(e),
        }
        if let Some(buffer) = self.active.take() {
            self.callback.buffer_discarded(buffer);
        }

        if self.stop_requested {
            if let Err(e) = self.dev.lower_clock().await {
                self.callback.io_error(e);
            }
            self.dev.delay_ms(STOP_SETTLE_MS).await;
        }

        self.shared.clear_inbox();
        self.callback.stream_complete();
        self.shared.set_running(false);
        self.shared.finished.signal(());
        info!("feed worker finished");
        self.callback
    }
}
