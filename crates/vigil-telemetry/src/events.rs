//! Feed activity events
//!
//! The connection manager broadcasts these alongside the status watch so a
//! caller can follow transitions and rejected frames without polling.

use vigil_protocol::DecodeError;

use crate::reconnect::ConnectionStatus;

/// Activity on the detection feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Connection status changed
    StateChanged(ConnectionStatus),

    /// A frame failed to decode and was dropped
    FrameRejected {
        /// Why the frame was rejected
        error: DecodeError,
    },

    /// A heartbeat frame arrived
    Heartbeat,
}
