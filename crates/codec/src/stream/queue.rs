//! Pending-buffer FIFO shared by the producer and the feed engine
//!
//! The lock only ever covers a push or a pop. Nothing awaits, calls back or
//! touches the bus while holding it, so contention is short; taking it is
//! still bounded by a timeout so a wedged holder surfaces as
//! [`CodecError::QueueLock`] instead of a silent hang.

use alloc::collections::VecDeque;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration};

use super::buffer::AudioBuffer;
use crate::config::QUEUE_LOCK_TIMEOUT;
use crate::error::CodecError;

/// Unbounded FIFO of audio buffers.
pub struct BufferQueue<M: RawMutex> {
    pub(crate) buffers: Mutex<M, VecDeque<AudioBuffer>>,
    available: Signal<M, ()>,
    lock_timeout: Duration,
}

impl<M: RawMutex> BufferQueue<M> {
    /// Empty queue with the default lock timeout.
    pub const fn new() -> Self {
        Self::with_lock_timeout(QUEUE_LOCK_TIMEOUT)
    }

    /// Empty queue with a custom lock timeout.
    pub const fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            buffers: Mutex::new(VecDeque::new()),
            available: Signal::new(),
            lock_timeout,
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, M, VecDeque<AudioBuffer>>, CodecError> {
        with_timeout(self.lock_timeout, self.buffers.lock())
            .await
            .map_err(|_| {
                warn!("buffer queue lock timed out");
                CodecError::QueueLock
            })
    }

    /// Append at the tail, rewinding the buffer's cursor.
    pub async fn enqueue(&self, mut buffer: AudioBuffer) -> Result<(), CodecError> {
        buffer.rewind();
        self.lock().await?.push_back(buffer);
        self.available.signal(());
        Ok(())
    }

    /// Remove the head, or `None` when empty.
    pub async fn dequeue(&self) -> Result<Option<AudioBuffer>, CodecError> {
        Ok(self.lock().await?.pop_front())
    }

    /// Remove the head, waiting up to `timeout` for one to be enqueued.
    pub async fn dequeue_wait(&self, timeout: Duration) -> Result<AudioBuffer, CodecError> {
        with_timeout(timeout, self.wait_for_buffer())
            .await
            .map_err(|_| CodecError::NoBuffer)?
    }

    async fn wait_for_buffer(&self) -> Result<AudioBuffer, CodecError> {
        loop {
            if let Some(buffer) = self.dequeue().await? {
                return Ok(buffer);
            }
            self.available.wait().await;
        }
    }

    /// Empty the queue, returning every buffer in order.
    pub async fn take_all(&self) -> Result<VecDeque<AudioBuffer>, CodecError> {
        Ok(core::mem::take(&mut *self.lock().await?))
    }

    /// Number of queued buffers.
    pub async fn len(&self) -> Result<usize, CodecError> {
        Ok(self.lock().await?.len())
    }

    /// Whether no buffers are queued.
    pub async fn is_empty(&self) -> Result<bool, CodecError> {
        Ok(self.lock().await?.is_empty())
    }
}

impl<M: RawMutex> Default for BufferQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}
