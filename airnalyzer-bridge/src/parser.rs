//! Line decoding and parsing for the board's serial output.
//!
//! The firmware prints one JSON object per reading, interleaved with plain-text
//! log lines. Both are normal traffic: objects become `Metrics`, everything else
//! becomes `Raw`.

use crate::models::ParsedEvent;
use serde_json::Value;

/// Permissive byte → text decoding. Invalid UTF-8 is replaced, never rejected.
/// Surrounding whitespace (including the `\r\n` terminator) is stripped.
pub fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim().to_string(),
        Err(_) => String::from_utf8_lossy(bytes).trim().to_string(),
    }
}

pub fn parse_line(line: &str) -> ParsedEvent {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(data)) => ParsedEvent::Metrics { data },
        // scalars and arrays decode fine but carry no named metrics
        Ok(_) | Err(_) => ParsedEvent::Raw {
            text: line.to_string(),
        },
    }
}
