//! Transport seam for the detection feed
//!
//! The connection manager only sees these traits. [`crate::ws`] provides the
//! WebSocket implementation; tests script their own.

use async_trait::async_trait;

use crate::error::TransportError;

/// One inbound message from the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Text frame (JSON)
    Text(String),
    /// Binary frame (UTF-8 JSON is accepted)
    Binary(Vec<u8>),
}

/// Establishes feed streams
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open a stream; returns once the handshake has completed
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError>;

    /// Endpoint description for logs
    fn describe(&self) -> String;
}

/// An established feed stream
#[async_trait]
pub trait FrameStream: Send {
    /// Next message
    ///
    /// `None` means the remote closed the stream cleanly. Control frames are
    /// handled internally and never surface here.
    async fn next_message(&mut self) -> Option<Result<FeedMessage, TransportError>>;

    /// Close the stream
    async fn close(&mut self) -> Result<(), TransportError>;
}
