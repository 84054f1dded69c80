//! Audio buffers handed between the producer and the feed engine
//!
//! A buffer has exactly one owner at a time: the producer builds it, the
//! queue holds it until it is popped, the engine holds it while it streams,
//! and the completion callback hands it back. There is no sharing, so no
//! reference count.

use alloc::vec::Vec;

/// Producer-assigned buffer identity, echoed in callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferId(pub u32);

/// One chunk of encoded audio plus its stream cursor.
///
/// `max_bytes` is the capacity the producer allocated. A buffer that holds
/// fewer bytes than its capacity is the last one of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    id: BufferId,
    samples: Vec<u8>,
    end: usize,
    max_bytes: usize,
    cursor: usize,
}

impl AudioBuffer {
    /// Buffer with `samples` valid bytes out of a `max_bytes` allocation.
    ///
    /// `max_bytes` smaller than the payload is raised to the payload length.
    pub fn new(id: BufferId, samples: Vec<u8>, max_bytes: usize) -> Self {
        let end = samples.len();
        Self {
            id,
            samples,
            end,
            max_bytes: max_bytes.max(end),
            cursor: 0,
        }
    }

    /// Buffer filled to capacity (not the end of the stream).
    pub fn full(id: BufferId, samples: Vec<u8>) -> Self {
        let len = samples.len();
        Self::new(id, samples, len)
    }

    /// Producer-assigned identity
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Valid bytes in the buffer
    pub fn len(&self) -> usize {
        self.end
    }

    /// Whether the buffer carries no payload
    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Allocated capacity
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Bytes already sent
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes left to send
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.cursor)
    }

    /// Short buffer: the producer had no more data for this stream.
    pub fn is_final(&self) -> bool {
        self.end < self.max_bytes
    }

    /// Every valid byte has been sent.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.end
    }

    /// Up to `max` unsent bytes starting at the cursor.
    pub fn next_block(&self, max: usize) -> &[u8] {
        let stop = self.cursor.saturating_add(max).min(self.end);
        self.samples.get(self.cursor..stop).unwrap_or(&[])
    }

    /// Mark `sent` more bytes as transferred.
    pub fn advance(&mut self, sent: usize) {
        self.cursor = self.cursor.saturating_add(sent).min(self.end);
    }

    /// Drop everything after the cursor.
    ///
    /// Used once the decoder has acknowledged a cancel: the rest of the
    /// buffer will never be played, and the shortened buffer now reads as
    /// the final one.
    pub fn truncate(&mut self) {
        self.end = self.cursor;
    }

    /// Reset the cursor so the buffer streams from its first byte.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Take the allocation back for reuse.
    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }
}
