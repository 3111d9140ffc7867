//! Vigil Protocol Library
//!
//! This crate defines the data that flows through the Vigil telemetry core:
//!
//! - **DetectionEvent**: one immutable record per AI response analyzed by the
//!   remote reliability service
//! - **Frame decoding**: turns inbound feed messages (JSON text) into events,
//!   rejecting malformed frames without affecting the connection
//! - **Export**: flat CSV projection of buffered events for download
//!
//! # Wire Format
//!
//! Frames are JSON objects with camelCase keys. Unknown keys are ignored.
//! A frame with `"type": "heartbeat"` carries no event and is skipped by the
//! ingestion path.
//!
//! ```json
//! {
//!   "sourceId": "it_bot",
//!   "query": "reset my password",
//!   "output": "Visit the portal...",
//!   "riskScore": 0.12,
//!   "flagged": false,
//!   "processingTimeMs": 184.0,
//!   "timestamp": "2026-03-01T12:00:00Z",
//!   "flaggedSegments": []
//! }
//! ```
//!
//! # Example
//!
//! ```rust
//! use vigil_protocol::{decode_frame, Frame};
//!
//! let text = r#"{"sourceId":"it_bot","query":"q","output":"o","riskScore":0.4,
//!     "flagged":true,"processingTimeMs":120,"timestamp":1700000000000}"#;
//!
//! match decode_frame(text).unwrap() {
//!     Frame::Detection(event) => assert!(event.flagged),
//!     Frame::Heartbeat => unreachable!(),
//! }
//! ```

pub mod error;
pub mod event;
pub mod export;
pub mod frame;

pub use error::DecodeError;
pub use event::{DetectionEvent, SourceId};
pub use export::{to_csv, write_csv, CSV_HEADER};
pub use frame::{decode_frame, decode_frame_bytes, Frame};
