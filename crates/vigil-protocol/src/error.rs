//! Error types for feed frame decoding

use thiserror::Error;

/// Errors that can occur while decoding an inbound feed frame
///
/// Every variant is recoverable: the frame is dropped and the connection
/// keeps running.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Frame text is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Frame is valid JSON but not an object
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Frame carries a `type` tag we do not understand
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    /// A required field is missing or has the wrong shape
    #[error("malformed detection event: {0}")]
    Malformed(String),

    /// Risk score outside [0, 1]
    #[error("risk score out of range: {0}")]
    RiskOutOfRange(f64),

    /// Processing time negative or not finite
    #[error("invalid processing time: {0}ms")]
    InvalidProcessingTime(f64),

    /// Source id is empty or whitespace
    #[error("empty source id")]
    EmptySourceId,
}
