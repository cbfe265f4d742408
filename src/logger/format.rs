//! Line format for persisted records.
//!
//! One record per line, fields in fixed positions separated by `" | "`:
//!
//! ```text
//! timestamp | correlation id | severity | kind | operation | origin -> destination | message
//! ```
//!
//! Commit records append `| code | duration | error`. Empty fields are
//! written as `-`; backslashes, delimiters and line breaks inside text fields
//! are escaped so a record always occupies exactly one line.

use std::fmt::Write;

use crate::record::Record;

/// Field separator
pub const FIELD_SEPARATOR: &str = " | ";

/// Timestamp layout (microsecond resolution)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Placeholder for empty fields
const EMPTY_FIELD: &str = "-";

/// Append `record` as one newline-terminated line to `out`.
pub fn format_record(record: &Record, out: &mut String) {
    // Writing into a String cannot fail.
    let _ = write!(out, "{}", record.timestamp().format(TIMESTAMP_FORMAT));
    out.push_str(FIELD_SEPARATOR);
    push_text(out, record.correlation_id());
    out.push_str(FIELD_SEPARATOR);
    out.push_str(record.severity().as_str());
    out.push_str(FIELD_SEPARATOR);
    out.push_str(record.kind().as_str());
    out.push_str(FIELD_SEPARATOR);
    push_text(out, record.operation().as_str());
    out.push_str(FIELD_SEPARATOR);
    push_text(out, record.origin());
    out.push_str(" -> ");
    push_text(out, record.destination());
    out.push_str(FIELD_SEPARATOR);
    push_text(out, record.message());

    if let Some(outcome) = record.outcome() {
        out.push_str(FIELD_SEPARATOR);
        let _ = write!(out, "{}", outcome.code);
        out.push_str(FIELD_SEPARATOR);
        let _ = write!(out, "{:.3}ms", outcome.duration.as_secs_f64() * 1000.0);
        out.push_str(FIELD_SEPARATOR);
        push_text(out, outcome.error.as_deref().unwrap_or(""));
    }

    out.push('\n');
}

/// Format `record` into a fresh string
pub fn format_line(record: &Record) -> String {
    let mut line = String::with_capacity(160);
    format_record(record, &mut line);
    line
}

fn push_text(out: &mut String, text: &str) {
    if text.is_empty() {
        out.push_str(EMPTY_FIELD);
        return;
    }
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '|' => out.push_str("\\|"),
            _ => out.push(ch),
        }
    }
}
