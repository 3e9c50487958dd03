//! Codec for the two log record formats hubs upload.
//!
//! ## Legacy line (v1)
//!
//! One JSON object serialized as a single newline-terminated line:
//!
//! ```text
//! {"type": "audio received", ..., "last_log_serial": 12, "last_log_time": 1466428800.5}
//! ```
//!
//! Only `last_log_serial` and `last_log_time` are interpreted; everything else
//! is opaque hub data. The raw bytes are preserved exactly as received because
//! downstream consumers replay the stream, so encoding a decoded line must
//! round-trip byte-for-byte (whitespace and field order included).
//!
//! ## Chunk (v2)
//!
//! A discrete JSON object:
//!
//! ```text
//! {"event": "...", "log_index": 3, "log_serial": 3, "log_timestamp": 1466428800.5, "data": {...}}
//! ```
//!
//! `log_index` is unique within a meeting and is the upsert key;
//! `log_serial` marks upload progress and drives gap detection.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors that can occur while decoding a log record
#[derive(Debug)]
pub enum EntryError {
    /// The record is not well-formed JSON or is missing required fields
    MalformedEntry { reason: String },
    /// The chunk `data` payload is not structured data (JSON object)
    InvalidPayload { got: &'static str },
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::MalformedEntry { reason } => {
                write!(f, "Malformed log entry: {}", reason)
            }
            EntryError::InvalidPayload { got } => {
                write!(f, "Chunk data payload must be a JSON object, got {}", got)
            }
        }
    }
}

impl std::error::Error for EntryError {}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One discrete log record in the v2 upload protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub event: String,
    pub log_index: i64,
    pub log_serial: i64,
    pub log_timestamp: f64,
    pub data: Value,
}

impl ChunkRecord {
    /// Decode one chunk object, validating that the payload is structured data
    pub fn decode(value: &Value) -> Result<ChunkRecord, EntryError> {
        let chunk: ChunkRecord = serde_json::from_value(value.clone())
            .map_err(|e| EntryError::MalformedEntry {
                reason: e.to_string(),
            })?;

        if !chunk.data.is_object() {
            return Err(EntryError::InvalidPayload {
                got: json_type_name(&chunk.data),
            });
        }

        Ok(chunk)
    }
}

/// One line of a meeting's legacy append-only log, with the raw bytes kept
/// for verbatim replay
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLine {
    raw: String,
    pub last_log_serial: i64,
    pub last_log_time: f64,
}

impl LegacyLine {
    /// Decode one candidate line. The line may or may not carry its trailing
    /// newline; the raw form is normalized to always end with one so that
    /// appended streams stay line-delimited.
    pub fn decode(line: &str) -> Result<LegacyLine, EntryError> {
        let parsed: Value =
            serde_json::from_str(line).map_err(|e| EntryError::MalformedEntry {
                reason: e.to_string(),
            })?;

        let obj = parsed.as_object().ok_or(EntryError::InvalidPayload {
            got: json_type_name(&parsed),
        })?;

        let last_log_serial = obj
            .get("last_log_serial")
            .and_then(Value::as_i64)
            .ok_or_else(|| EntryError::MalformedEntry {
                reason: "missing integer field `last_log_serial`".to_string(),
            })?;

        let last_log_time = obj
            .get("last_log_time")
            .and_then(Value::as_f64)
            .ok_or_else(|| EntryError::MalformedEntry {
                reason: "missing numeric field `last_log_time`".to_string(),
            })?;

        let raw = if line.ends_with('\n') {
            line.to_string()
        } else {
            format!("{}\n", line)
        };

        Ok(LegacyLine {
            raw,
            last_log_serial,
            last_log_time,
        })
    }

    /// The exact bytes to write back to the stream (inverse of `decode`)
    pub fn encode(&self) -> &str {
        &self.raw
    }
}
