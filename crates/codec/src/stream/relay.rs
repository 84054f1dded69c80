//! DREQ interrupt relay
//!
//! The board's DREQ edge handler calls [`InterruptRelay::on_ready_edge`].
//! The relay borrows the [`FeedShared`] it was created from, so the handler
//! captures its device context directly; there is no table of devices
//! indexed by interrupt number.
//!
//! ```rust,ignore
//! static FEED: FeedShared<CriticalSectionRawMutex> = FeedShared::new();
//!
//! #[interrupt]
//! fn EXTI9_5() {
//!     clear_dreq_pending();
//!     FEED.relay().on_ready_edge();
//! }
//! ```

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::state::FeedMessage;
use super::FeedShared;

/// Interrupt-context handle that forwards DREQ edges to the worker.
///
/// Never touches the bus, never blocks, never allocates.
pub struct InterruptRelay<'a, M: RawMutex> {
    shared: &'a FeedShared<M>,
}

impl<M: RawMutex> Clone for InterruptRelay<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for InterruptRelay<'_, M> {}

impl<'a, M: RawMutex> InterruptRelay<'a, M> {
    pub(crate) fn new(shared: &'a FeedShared<M>) -> Self {
        Self { shared }
    }

    /// Handle one DREQ rising edge.
    ///
    /// Posts a data request while a stream is running. Returns whether a
    /// request was posted. Edges outside a stream, or while the inbox is
    /// already full of work, are dropped: the worker re-reads the DREQ
    /// level before every block, so a pending request covers any number of
    /// edges.
    pub fn on_ready_edge(&self) -> bool {
        if !self.shared.is_running() {
            return false;
        }
        let posted = self.shared.post(FeedMessage::DataRequest);
        if !posted {
            trace!("inbox full, DREQ edge coalesced");
        }
        posted
    }
}
