//! Tabular export of detection events
//!
//! One CSV row per event, RFC 4180 quoting. Flagged segments are joined with
//! `|` into a single column.

use std::borrow::Cow;
use std::io::{self, Write};

use chrono::SecondsFormat;

use crate::event::DetectionEvent;

/// Header row for exported event tables
pub const CSV_HEADER: &str = "timestamp,source_id,risk_score,flagged,processing_time_ms,query,output,flagged_segments,mitigation";

/// Separator between flagged segments inside one cell
const SEGMENT_SEPARATOR: &str = "|";

/// Quote a field if it contains a delimiter, quote, or line break
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Format one event as a CSV row (without trailing newline)
pub fn csv_row(event: &DetectionEvent) -> String {
    let segments = event.flagged_segments.join(SEGMENT_SEPARATOR);
    format!(
        "{},{},{},{},{},{},{},{},{}",
        event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        escape_field(event.source_id.as_str()),
        event.risk_score,
        event.flagged,
        event.processing_time_ms,
        escape_field(&event.query),
        escape_field(&event.output),
        escape_field(&segments),
        escape_field(event.mitigation.as_deref().unwrap_or("")),
    )
}

/// Format events as a CSV document, header included
pub fn to_csv<'a, I>(events: I) -> String
where
    I: IntoIterator<Item = &'a DetectionEvent>,
{
    let mut output = String::new();
    output.push_str(CSV_HEADER);
    output.push('\n');

    for event in events {
        output.push_str(&csv_row(event));
        output.push('\n');
    }

    output
}

/// Stream events as CSV to a writer
pub fn write_csv<'a, W, I>(mut writer: W, events: I) -> io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a DetectionEvent>,
{
    writeln!(writer, "{}", CSV_HEADER)?;
    let mut rows = 0;
    for event in events {
        writeln!(writer, "{}", csv_row(event))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use proptest::prelude::*;

    use super::*;

    fn event() -> DetectionEvent {
        DetectionEvent::new(
            "it_bot",
            0.5,
            true,
            120.0,
            DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        )
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_csv_row_layout() {
        let row = csv_row(
            &event()
                .with_text("reset, please", "ok")
                .with_segments(vec!["a".into(), "b".into()])
                .with_mitigation("rephrase"),
        );
        assert_eq!(
            row,
            "2023-11-14T22:13:20.000Z,it_bot,0.5,true,120,\"reset, please\",ok,a|b,rephrase"
        );
    }

    #[test]
    fn test_to_csv_has_header_and_rows() {
        let events = [event(), event()];
        let csv = to_csv(events.iter());
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
    }

    #[test]
    fn test_write_csv_counts_rows() {
        let events = [event()];
        let mut buf = Vec::new();
        let rows = write_csv(&mut buf, events.iter()).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(String::from_utf8(buf).unwrap(), to_csv(events.iter()));
    }

    /// Undo RFC 4180 quoting of a single field
    fn unescape(field: &str) -> String {
        match field.strip_prefix('"').and_then(|f| f.strip_suffix('"')) {
            Some(inner) => inner.replace("\"\"", "\""),
            None => field.to_string(),
        }
    }

    proptest! {
        #[test]
        fn escaped_field_unescapes_to_original(field in "[a-z,\"\n\r |]{0,24}") {
            prop_assert_eq!(unescape(&escape_field(&field)), field);
        }

        #[test]
        fn escaped_field_has_no_bare_quotes(field in "[a-z,\"\n ]{0,24}") {
            let escaped = escape_field(&field);
            let body = escaped
                .strip_prefix('"')
                .and_then(|f| f.strip_suffix('"'))
                .unwrap_or(escaped.as_ref());
            prop_assert_eq!(body.replace("\"\"", "").matches('"').count(), 0);
        }
    }
}
