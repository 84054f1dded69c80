//! Streaming feed engine
//!
//! Moves encoded audio from the producer into the decoder FIFO.
//!
//! | Context | Touches |
//! |---------|---------|
//! | producer / control task | [`BufferQueue`] (lock), worker inbox (send) |
//! | DREQ interrupt | worker inbox (`try_send` only) via [`InterruptRelay`] |
//! | worker ([`FeedEngine::run`]) | everything else: bus, DREQ mask, [`FeedState`] |
//!
//! [`FeedShared`] is the meeting point. It is `const`-constructible so it can
//! live in a `static` that both the interrupt handler and the tasks see.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Duration;

use crate::config::{INBOX_DEPTH, QUEUE_LOCK_TIMEOUT};
use crate::error::CodecError;

pub mod buffer;
pub mod control;
pub mod drain;
pub mod engine;
pub mod queue;
pub mod relay;
pub mod state;
mod worker;

pub use buffer::{AudioBuffer, BufferId};
pub use control::FeedControl;
pub use drain::{DrainAction, DrainPhase, DrainTracker};
pub use engine::FeedEngine;
pub use queue::BufferQueue;
pub use relay::InterruptRelay;
pub use state::{FeedMessage, FeedState};

/// Upper-half notifications from the worker.
///
/// Called from the worker task, never from interrupt context and never with
/// the queue lock held.
pub trait AudioCallback {
    /// Every byte of `buffer` has been handed to the bus. Ownership returns
    /// to the producer.
    fn buffer_dequeued(&mut self, buffer: AudioBuffer);

    /// `buffer` is released without having been played in full (stop,
    /// teardown, or queued after the final buffer).
    fn buffer_discarded(&mut self, buffer: AudioBuffer) {
        let _ = buffer;
    }

    /// The stream is over and the worker has exited. Called once per start.
    fn stream_complete(&mut self);

    /// An operation was aborted. The engine stays usable.
    fn io_error(&mut self, error: CodecError);
}

impl<T: AudioCallback + ?Sized> AudioCallback for &mut T {
    fn buffer_dequeued(&mut self, buffer: AudioBuffer) {
        T::buffer_dequeued(self, buffer);
    }

    fn buffer_discarded(&mut self, buffer: AudioBuffer) {
        T::buffer_discarded(self, buffer);
    }

    fn stream_complete(&mut self) {
        T::stream_complete(self);
    }

    fn io_error(&mut self, error: CodecError) {
        T::io_error(self, error);
    }
}

/// State shared between the worker, the interrupt relay and the control API.
pub struct FeedShared<M: RawMutex> {
    pub(crate) queue: BufferQueue<M>,
    pub(crate) inbox: Channel<M, FeedMessage, INBOX_DEPTH>,
    running: AtomicBool,
    pub(crate) finished: Signal<M, ()>,
}

impl<M: RawMutex> FeedShared<M> {
    /// Idle shared state with the default queue lock timeout.
    pub const fn new() -> Self {
        Self::with_lock_timeout(QUEUE_LOCK_TIMEOUT)
    }

    /// Idle shared state with a custom queue lock timeout.
    pub const fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            queue: BufferQueue::with_lock_timeout(lock_timeout),
            inbox: Channel::new(),
            running: AtomicBool::new(false),
            finished: Signal::new(),
        }
    }

    /// Control handle for the upper half.
    pub fn control(&self) -> FeedControl<'_, M> {
        FeedControl::new(self)
    }

    /// Relay handle for the DREQ interrupt handler.
    pub fn relay(&self) -> InterruptRelay<'_, M> {
        InterruptRelay::new(self)
    }

    /// The pending-buffer queue.
    pub fn queue(&self) -> &BufferQueue<M> {
        &self.queue
    }

    /// Whether a worker is currently running a stream.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Non-blocking post; `false` when the inbox is full.
    pub(crate) fn post(&self, message: FeedMessage) -> bool {
        self.inbox.try_send(message).is_ok()
    }

    /// Drop stale messages left over from a previous stream.
    pub(crate) fn clear_inbox(&self) {
        while self.inbox.try_receive().is_ok() {}
    }

    /// Wait until the worker has exited. Any number of tasks may wait.
    pub(crate) async fn wait_finished(&self) {
        while self.is_running() {
            self.finished.wait().await;
        }
        // Pass the wake on to the next waiter.
        self.finished.signal(());
    }

    /// Prepare for a new stream.
    pub(crate) fn reset_for_start(&self) {
        self.clear_inbox();
        self.finished.reset();
    }
}

impl<M: RawMutex> Default for FeedShared<M> {
    fn default() -> Self {
        Self::new()
    }
}
