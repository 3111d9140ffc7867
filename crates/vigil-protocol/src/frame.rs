//! Feed frame decoding
//!
//! A frame is one message received from the detection feed. Decoding is
//! strict about required fields and lenient about everything else, so the
//! service can add fields without breaking older clients.

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::DecodeError;
use crate::event::DetectionEvent;

/// Key used to tag non-detection frames
const TYPE_KEY: &str = "type";

/// A decoded feed frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A detection result
    Detection(DetectionEvent),
    /// Keep-alive from the feed; carries no data
    Heartbeat,
}

impl Frame {
    /// Get the detection event, if this frame carries one
    pub fn into_event(self) -> Option<DetectionEvent> {
        match self {
            Frame::Detection(event) => Some(event),
            Frame::Heartbeat => None,
        }
    }
}

/// Decode a text frame
pub fn decode_frame(text: &str) -> Result<Frame, DecodeError> {
    decode_frame_bytes(text.as_bytes())
}

/// Decode a frame from raw bytes (binary WebSocket messages)
pub fn decode_frame_bytes(data: &[u8]) -> Result<Frame, DecodeError> {
    let value: Value =
        serde_json::from_slice(data).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    match frame_type(&object)? {
        FrameType::Heartbeat => {
            trace!("Heartbeat frame");
            Ok(Frame::Heartbeat)
        }
        FrameType::Detection => {
            let event: DetectionEvent = serde_json::from_value(Value::Object(object))
                .map_err(|e| DecodeError::Malformed(e.to_string()))?;
            event.validate()?;
            Ok(Frame::Detection(event))
        }
    }
}

enum FrameType {
    Detection,
    Heartbeat,
}

/// Untagged frames are detections
fn frame_type(object: &Map<String, Value>) -> Result<FrameType, DecodeError> {
    match object.get(TYPE_KEY) {
        None | Some(Value::Null) => Ok(FrameType::Detection),
        Some(Value::String(tag)) => match tag.as_str() {
            "detection" => Ok(FrameType::Detection),
            "heartbeat" | "ping" => Ok(FrameType::Heartbeat),
            other => Err(DecodeError::UnknownFrameType(other.to_string())),
        },
        Some(other) => Err(DecodeError::UnknownFrameType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "sourceId": "it_bot",
        "query": "how do I reset my VPN token?",
        "output": "Open the portal and...",
        "riskScore": 0.82,
        "flagged": true,
        "processingTimeMs": 231.5,
        "timestamp": "2026-03-01T12:00:00.250Z",
        "flaggedSegments": ["the portal", "token"],
        "mitigation": "Verify the portal URL"
    }"#;

    #[test]
    fn test_decode_full_frame() {
        let event = decode_frame(FULL).unwrap().into_event().unwrap();
        assert_eq!(event.source_id.as_str(), "it_bot");
        assert_eq!(event.risk_score, 0.82);
        assert!(event.flagged);
        assert_eq!(event.processing_time_ms, 231.5);
        assert_eq!(event.flagged_segments, vec!["the portal", "token"]);
        assert_eq!(event.mitigation.as_deref(), Some("Verify the portal URL"));
        assert_eq!(event.timestamp.timestamp_millis(), 1_772_366_400_250);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let text = r#"{"sourceId":"a","query":"","output":"","riskScore":0.1,"flagged":false,
            "processingTimeMs":3,"timestamp":1700000000000,"model":"gpt","extra":{"x":1}}"#;
        let event = decode_frame(text).unwrap().into_event().unwrap();
        assert!(event.flagged_segments.is_empty());
        assert!(event.mitigation.is_none());
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_missing_required_field_rejected() {
        // No riskScore
        let text = r#"{"sourceId":"a","query":"","output":"","flagged":false,
            "processingTimeMs":3,"timestamp":1700000000000}"#;
        assert!(matches!(decode_frame(text), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let text = r#"{"sourceId":"a","query":"","output":"","riskScore":1.5,"flagged":false,
            "processingTimeMs":3,"timestamp":1700000000000}"#;
        assert_eq!(decode_frame(text), Err(DecodeError::RiskOutOfRange(1.5)));
    }

    #[test]
    fn test_heartbeat_and_unknown_types() {
        assert_eq!(decode_frame(r#"{"type":"heartbeat"}"#), Ok(Frame::Heartbeat));
        assert_eq!(decode_frame(r#"{"type":"ping","seq":4}"#), Ok(Frame::Heartbeat));
        assert_eq!(
            decode_frame(r#"{"type":"status"}"#),
            Err(DecodeError::UnknownFrameType("status".to_string()))
        );
    }

    #[test]
    fn test_non_object_and_garbage() {
        assert_eq!(decode_frame("[1,2,3]"), Err(DecodeError::NotAnObject));
        assert!(matches!(
            decode_frame("{not json"),
            Err(DecodeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_fractional_millis_timestamp() {
        let text = r#"{"sourceId":"a","query":"","output":"","riskScore":0.1,"flagged":false,
            "processingTimeMs":3,"timestamp":1700000000000.75}"#;
        let event = decode_frame(text).unwrap().into_event().unwrap();
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let text = r#"{"sourceId":"a","query":"","output":"","riskScore":0.1,"flagged":false,
            "processingTimeMs":3,"timestamp":"yesterday"}"#;
        assert!(matches!(decode_frame(text), Err(DecodeError::Malformed(_))));
    }
}
