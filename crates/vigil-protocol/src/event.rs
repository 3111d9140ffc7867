//! Detection event model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Identifies the agent or workstation that emitted a detection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a source id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Outcome of analyzing a single AI response for reliability issues
///
/// Events are shared read-only (behind `Arc`) once they leave the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// Agent or workstation that produced the response
    pub source_id: SourceId,
    /// Prompt sent to the model
    pub query: String,
    /// Model output that was analyzed
    pub output: String,
    /// Risk score in [0, 1]
    pub risk_score: f64,
    /// Whether the service flagged the response
    pub flagged: bool,
    /// Time the service spent analyzing the response
    pub processing_time_ms: f64,
    /// When the service produced the detection
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Output fragments that triggered the flag
    #[serde(default)]
    pub flagged_segments: Vec<String>,
    /// Suggested mitigation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
}

impl DetectionEvent {
    /// Create an event with empty text payloads
    pub fn new(
        source_id: impl Into<SourceId>,
        risk_score: f64,
        flagged: bool,
        processing_time_ms: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            query: String::new(),
            output: String::new(),
            risk_score,
            flagged,
            processing_time_ms,
            timestamp,
            flagged_segments: Vec::new(),
            mitigation: None,
        }
    }

    /// Attach the query and output text
    pub fn with_text(mut self, query: impl Into<String>, output: impl Into<String>) -> Self {
        self.query = query.into();
        self.output = output.into();
        self
    }

    /// Attach the flagged segments
    pub fn with_segments(mut self, segments: Vec<String>) -> Self {
        self.flagged_segments = segments;
        self
    }

    /// Attach a mitigation suggestion
    pub fn with_mitigation(mut self, mitigation: impl Into<String>) -> Self {
        self.mitigation = Some(mitigation.into());
        self
    }

    /// Check the value ranges the wire format cannot express
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.source_id.as_str().trim().is_empty() {
            return Err(DecodeError::EmptySourceId);
        }
        if !(0.0..=1.0).contains(&self.risk_score) {
            return Err(DecodeError::RiskOutOfRange(self.risk_score));
        }
        if !self.processing_time_ms.is_finite() || self.processing_time_ms < 0.0 {
            return Err(DecodeError::InvalidProcessingTime(self.processing_time_ms));
        }
        Ok(())
    }
}

/// Timestamps arrive either as RFC 3339 strings or epoch milliseconds and are
/// always written back as RFC 3339 with millisecond precision.
pub(crate) mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        FractionalMillis(f64),
        Text(String),
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Millis(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
            RawTimestamp::FractionalMillis(ms) if ms.is_finite() => {
                DateTime::from_timestamp_millis(ms as i64)
                    .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}")))
            }
            RawTimestamp::FractionalMillis(ms) => {
                Err(D::Error::custom(format!("timestamp is not finite: {ms}")))
            }
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| D::Error::custom(format!("invalid timestamp {text:?}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_validate_accepts_boundaries() {
        assert!(DetectionEvent::new("a", 0.0, false, 0.0, ts()).validate().is_ok());
        assert!(DetectionEvent::new("a", 1.0, true, 5.5, ts()).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert_eq!(
            DetectionEvent::new("a", 1.2, false, 0.0, ts()).validate(),
            Err(DecodeError::RiskOutOfRange(1.2))
        );
        assert_eq!(
            DetectionEvent::new("a", 0.5, false, -1.0, ts()).validate(),
            Err(DecodeError::InvalidProcessingTime(-1.0))
        );
        assert_eq!(
            DetectionEvent::new("  ", 0.5, false, 1.0, ts()).validate(),
            Err(DecodeError::EmptySourceId)
        );
        assert!(DetectionEvent::new("a", f64::NAN, false, 1.0, ts())
            .validate()
            .is_err());
    }

    #[test]
    fn test_serialize_uses_camel_case_and_rfc3339() {
        let event = DetectionEvent::new("it_bot", 0.25, true, 12.0, ts())
            .with_text("q", "o")
            .with_segments(vec!["bad".to_string()]);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["sourceId"], "it_bot");
        assert_eq!(json["processingTimeMs"], 12.0);
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20.000Z");
        assert_eq!(json["flaggedSegments"][0], "bad");
        assert!(json.get("mitigation").is_none());
    }

    #[test]
    fn test_source_id_display() {
        let id = SourceId::from("hr_assistant");
        assert_eq!(id.to_string(), "hr_assistant");
        assert_eq!(id.as_str(), "hr_assistant");
    }
}
