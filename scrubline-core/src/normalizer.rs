// scrubline-core/src/normalizer.rs
//! Record validation and normalization.
//!
//! A raw record must be a JSON object with a `type` discriminator, a
//! `timestamp` and a `payload` object. Problems come back as
//! [`ProcessingError`]s at `WARNING` (record still usable, a default is
//! filled in) or `ERROR` (record skipped). The normalizer never produces a
//! `CRITICAL`; that tier belongs to the coordinator.
//!
//! Top-level keys other than `type`, `timestamp`, `payload` and `metadata`
//! are kept in `metadata`. A key already present in `metadata` wins.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::summary::ProcessingError;

/// A record that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub record_type: String,
    /// `payload.type`, when the payload carries one.
    pub payload_type: Option<String>,
    /// The timestamp exactly as written, if present.
    pub timestamp: Option<String>,
    /// The timestamp in UTC, when it parsed as RFC 3339.
    pub parsed_timestamp: Option<DateTime<Utc>>,
    pub payload: Map<String, Value>,
    pub metadata: Map<String, Value>,
}

impl NormalizedRecord {
    /// Counter key for run summaries: `record_type` or
    /// `record_type.payload_type`.
    pub fn count_key(&self) -> String {
        match &self.payload_type {
            Some(payload_type) => format!("{}.{}", self.record_type, payload_type),
            None => self.record_type.clone(),
        }
    }
}

/// A normalized record plus the warnings raised on the way.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub record: NormalizedRecord,
    pub warnings: Vec<ProcessingError>,
}

/// Validates one raw record.
///
/// Returns `Err` with an `ERROR`-severity [`ProcessingError`] when the record
/// must be skipped.
pub fn normalize(raw: Value) -> Result<Normalized, ProcessingError> {
    let Value::Object(mut object) = raw else {
        return Err(ProcessingError::error(
            "invalid_record",
            format!("record must be a JSON object, found {}", json_kind(&raw)),
        ));
    };
    let mut warnings = Vec::new();

    let record_type = match object.remove("type") {
        Some(Value::String(t)) if !t.trim().is_empty() => t,
        _ => {
            return Err(ProcessingError::error(
                "missing_type",
                "record has no non-empty string 'type'",
            ))
        }
    };

    let (timestamp, parsed_timestamp) = match object.remove("timestamp") {
        None | Some(Value::Null) => {
            warnings.push(ProcessingError::warning("missing_timestamp", "record has no timestamp"));
            (None, None)
        }
        Some(Value::String(ts)) => {
            let parsed = DateTime::parse_from_rfc3339(&ts).map(|dt| dt.with_timezone(&Utc)).ok();
            if parsed.is_none() {
                warnings.push(ProcessingError::warning(
                    "unparsable_timestamp",
                    format!("timestamp '{}' is not RFC 3339", ts),
                ));
            }
            (Some(ts), parsed)
        }
        Some(other) => {
            return Err(ProcessingError::error(
                "invalid_timestamp",
                format!("timestamp must be a string, found {}", json_kind(&other)),
            ))
        }
    };

    let payload = match object.remove("payload") {
        None | Some(Value::Null) => {
            warnings.push(ProcessingError::warning("missing_payload", "record has no payload"));
            Map::new()
        }
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ProcessingError::error(
                "invalid_payload",
                format!("payload must be an object, found {}", json_kind(&other)),
            ))
        }
    };

    let mut metadata = match object.remove("metadata") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            warnings.push(ProcessingError::warning(
                "invalid_metadata",
                format!("metadata must be an object, found {}; replaced", json_kind(&other)),
            ));
            Map::new()
        }
    };

    for (key, value) in object {
        metadata.entry(key).or_insert(value);
    }

    let payload_type = payload.get("type").and_then(Value::as_str).map(str::to_string);

    Ok(Normalized {
        record: NormalizedRecord {
            record_type,
            payload_type,
            timestamp,
            parsed_timestamp,
            payload,
            metadata,
        },
        warnings,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::Severity;
    use serde_json::json;

    fn codes(errors: &[ProcessingError]) -> Vec<&str> {
        errors.iter().map(|e| e.code.as_str()).collect()
    }

    #[test]
    fn test_valid_record() {
        let n = normalize(json!({
            "type": "event_msg",
            "timestamp": "2025-01-02T03:04:05Z",
            "payload": {"type": "user_message", "message": "hi"},
            "metadata": {"k": 1}
        }))
        .unwrap();
        assert!(n.warnings.is_empty());
        assert_eq!(n.record.record_type, "event_msg");
        assert_eq!(n.record.payload_type.as_deref(), Some("user_message"));
        assert_eq!(n.record.count_key(), "event_msg.user_message");
        assert!(n.record.parsed_timestamp.is_some());
        assert_eq!(n.record.metadata["k"], 1);
    }

    #[test]
    fn test_non_object_is_error() {
        let err = normalize(json!([1, 2])).unwrap_err();
        assert_eq!(err.severity, Severity::Error);
        assert_eq!(err.code, "invalid_record");
    }

    #[test]
    fn test_missing_or_blank_type_is_error() {
        assert_eq!(normalize(json!({"payload": {}})).unwrap_err().code, "missing_type");
        assert_eq!(normalize(json!({"type": "  "})).unwrap_err().code, "missing_type");
        assert_eq!(normalize(json!({"type": 3})).unwrap_err().code, "missing_type");
    }

    #[test]
    fn test_missing_timestamp_and_payload_are_warnings() {
        let n = normalize(json!({"type": "session_meta"})).unwrap();
        assert_eq!(codes(&n.warnings), vec!["missing_timestamp", "missing_payload"]);
        assert!(n.warnings.iter().all(|w| w.severity == Severity::Warning));
        assert!(n.record.payload.is_empty());
        assert_eq!(n.record.count_key(), "session_meta");
    }

    #[test]
    fn test_timestamp_shapes() {
        let err = normalize(json!({"type": "x", "timestamp": 12, "payload": {}})).unwrap_err();
        assert_eq!(err.code, "invalid_timestamp");

        let n = normalize(json!({"type": "x", "timestamp": "yesterday", "payload": {}})).unwrap();
        assert_eq!(codes(&n.warnings), vec!["unparsable_timestamp"]);
        assert_eq!(n.record.timestamp.as_deref(), Some("yesterday"));
        assert!(n.record.parsed_timestamp.is_none());
    }

    #[test]
    fn test_payload_must_be_object() {
        let err = normalize(json!({"type": "x", "timestamp": "2025-01-01T00:00:00Z", "payload": "s"})).unwrap_err();
        assert_eq!(err.code, "invalid_payload");
    }

    #[test]
    fn test_bad_metadata_is_replaced() {
        let n = normalize(json!({"type": "x", "timestamp": "2025-01-01T00:00:00Z", "payload": {}, "metadata": 5}))
            .unwrap();
        assert_eq!(codes(&n.warnings), vec!["invalid_metadata"]);
        assert!(n.record.metadata.is_empty());
    }

    #[test]
    fn test_extra_top_level_keys_move_to_metadata() {
        let n = normalize(json!({
            "type": "event_msg",
            "timestamp": "2025-01-01T00:00:00Z",
            "payload": {},
            "metadata": {"origin": "explicit"},
            "origin": "top-level",
            "session_id": "s-1",
            "tags": ["a", "b"]
        }))
        .unwrap();
        assert!(n.warnings.is_empty());
        assert_eq!(n.record.metadata["origin"], "explicit");
        assert_eq!(n.record.metadata["session_id"], "s-1");
        assert_eq!(n.record.metadata["tags"], json!(["a", "b"]));
        assert!(!n.record.metadata.contains_key("type"));
        assert!(!n.record.metadata.contains_key("payload"));
    }
}
