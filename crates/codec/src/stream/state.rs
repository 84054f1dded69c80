//! Feed engine states and worker messages

use crate::vs1053::FeatureRequest;

/// Where the feed engine is in a stream's lifecycle.
///
/// Only the worker writes this. The interrupt relay never reads it either;
/// it goes by the shared `running` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeedState {
    /// No stream; the worker is finished or not started.
    Idle,
    /// Pumping bytes from the active buffer.
    Streaming,
    /// Stop requested and SM_CANCEL set; still streaming until the decoder
    /// clears it.
    CancelPending,
    /// Stream data is over; sending fill bytes until the decoder has reset.
    Draining,
    /// Ready interrupt masked, nothing sent.
    Paused,
}

impl FeedState {
    /// Short name for log output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::CancelPending => "cancel-pending",
            Self::Draining => "draining",
            Self::Paused => "paused",
        }
    }

    /// Whether `pump` may move bytes in this state.
    pub const fn is_pumping(self) -> bool {
        matches!(self, Self::Streaming | Self::CancelPending | Self::Draining)
    }
}

/// Notifications delivered to the worker inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeedMessage {
    /// DREQ went high (posted by the interrupt relay).
    DataRequest,
    /// A buffer was enqueued while the worker runs.
    Enqueue,
    /// Begin cancelling the stream.
    Stop,
    /// Mask the ready interrupt and hold.
    Pause,
    /// Unmask and re-prime.
    Resume,
    /// Apply a volume / tone change between pumps.
    Configure(FeatureRequest),
    /// Inbox closed: leave without draining.
    Shutdown,
}

impl FeedMessage {
    /// Short name for log output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DataRequest => "data-request",
            Self::Enqueue => "enqueue",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Configure(_) => "configure",
            Self::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_states_pump() {
        assert!(FeedState::Streaming.is_pumping());
        assert!(FeedState::CancelPending.is_pumping());
        assert!(FeedState::Draining.is_pumping());
        assert!(!FeedState::Paused.is_pumping());
        assert!(!FeedState::Idle.is_pumping());
    }

    #[test]
    fn names() {
        assert_eq!(FeedState::CancelPending.as_str(), "cancel-pending");
        assert_eq!(FeedMessage::DataRequest.as_str(), "data-request");
    }
}
