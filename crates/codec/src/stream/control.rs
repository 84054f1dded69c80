//! Upper-half control API
//!
//! Everything here is callable from any task while the worker runs. Nothing
//! touches the bus: requests become worker messages, buffers go through the
//! queue.

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::buffer::{AudioBuffer, BufferId};
use super::state::FeedMessage;
use super::FeedShared;
use crate::error::CodecError;
use crate::vs1053::FeatureRequest;

/// Control handle over a [`FeedShared`].
pub struct FeedControl<'a, M: RawMutex> {
    shared: &'a FeedShared<M>,
}

impl<M: RawMutex> Clone for FeedControl<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for FeedControl<'_, M> {}

// Every entry point returns a status, even those that cannot fail today.
#[allow(clippy::unnecessary_wraps)]
impl<'a, M: RawMutex> FeedControl<'a, M> {
    pub(crate) fn new(shared: &'a FeedShared<M>) -> Self {
        Self { shared }
    }

    /// Queue a buffer for playback.
    ///
    /// The queue is unbounded; the producer decides how many buffers it keeps
    /// in flight. A running worker is woken in case it had run dry.
    pub async fn enqueue(&self, buffer: AudioBuffer) -> Result<(), CodecError> {
        let id = buffer.id();
        self.shared.queue.enqueue(buffer).await?;
        trace!("enqueued buffer {}", id.0);
        if self.shared.is_running() && !self.shared.post(FeedMessage::Enqueue) {
            // The worker has messages pending and will look at the queue anyway.
            trace!("inbox full, enqueue wake coalesced");
        }
        Ok(())
    }

    /// Stop the stream and wait for the worker to exit.
    ///
    /// The worker finishes its current block, cancels decoding, drains and
    /// resets the decoder. Returns immediately when no stream is running.
    pub async fn stop(&self) -> Result<(), CodecError> {
        if !self.shared.is_running() {
            return Ok(());
        }
        debug!("stop requested");
        self.shared.inbox.send(FeedMessage::Stop).await;
        self.shared.wait_finished().await;
        Ok(())
    }

    /// Hold the stream: no bytes move until [`resume`](Self::resume).
    pub async fn pause(&self) -> Result<(), CodecError> {
        if self.shared.is_running() {
            self.shared.inbox.send(FeedMessage::Pause).await;
        }
        Ok(())
    }

    /// Continue a paused stream from where it stopped.
    pub async fn resume(&self) -> Result<(), CodecError> {
        if self.shared.is_running() {
            self.shared.inbox.send(FeedMessage::Resume).await;
        }
        Ok(())
    }

    /// Per-buffer cancel. Cancellation is whole-stream only, so this is a
    /// no-op; use [`stop`](Self::stop).
    pub fn cancel(&self, id: BufferId) -> Result<(), CodecError> {
        trace!("cancel of buffer {} ignored", id.0);
        Ok(())
    }

    /// Change volume or tone while a stream runs.
    ///
    /// With no stream running the worker is gone; configure the driver
    /// directly instead.
    pub async fn configure(&self, request: FeatureRequest) -> Result<(), CodecError> {
        if !self.shared.is_running() {
            return Err(CodecError::NotRunning);
        }
        self.shared.inbox.send(FeedMessage::Configure(request)).await;
        Ok(())
    }

    /// Close the inbox: the worker exits without draining.
    ///
    /// For teardown of the whole driver, not for ending a stream.
    pub async fn shutdown(&self) {
        if self.shared.is_running() {
            self.shared.inbox.send(FeedMessage::Shutdown).await;
            self.shared.wait_finished().await;
        }
    }

    /// Whether a stream is running.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }
}
