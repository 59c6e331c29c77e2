//! # Sync Payloads
//!
//! Parsing of inbound `sync-data` messages and encoding of the outbound
//! peer-result envelope.
//!
//! ## Accepted sync-data Forms
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Explicit        {"id":"card1","pin":"1234","name":"Ada"}            │
//! │                      └─ id removed, remaining fields = record           │
//! │                                                                         │
//! │  2. Envelope        {"card1":{"pin":"1234","name":"Ada"}}               │
//! │                      └─ exactly one key, value must be an object        │
//! │                                                                         │
//! │  Anything else      → CoreError (logged as MalformedPayload upstream)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The envelope form is only accepted with a single key, so which entry is
//! taken never depends on map iteration order.

use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::types::UserRecord;

/// A parsed partial credential update: the id plus its replacement record.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncUpdate {
    pub id: String,
    pub record: UserRecord,
}

impl SyncUpdate {
    /// Parses a raw `sync-data` payload.
    pub fn parse(payload: &[u8]) -> CoreResult<Self> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Object(mut object) = value else {
            return Err(CoreError::MalformedPayload(
                "sync-data must be a JSON object".into(),
            ));
        };

        match object.remove("id") {
            Some(Value::String(id)) => {
                if id.trim().is_empty() {
                    return Err(CoreError::MissingField("id".into()));
                }
                let record = record_from_map(object)?;
                Ok(SyncUpdate { id, record })
            }
            // {"id": {...}} is an envelope for a card whose id is literally "id"
            Some(Value::Object(fields)) if object.is_empty() => Ok(SyncUpdate {
                id: "id".into(),
                record: record_from_map(fields)?,
            }),
            Some(other) => Err(CoreError::MalformedPayload(format!(
                "id must be a string, got {}",
                other
            ))),
            None => Self::from_envelope(object),
        }
    }

    fn from_envelope(object: Map<String, Value>) -> CoreResult<Self> {
        if object.len() != 1 {
            return Err(CoreError::MissingField("id".into()));
        }

        let Some((id, value)) = object.into_iter().next() else {
            return Err(CoreError::MissingField("id".into()));
        };
        if id.trim().is_empty() {
            return Err(CoreError::MissingField("id".into()));
        }

        match value {
            Value::Object(fields) => Ok(SyncUpdate {
                id,
                record: record_from_map(fields)?,
            }),
            _ => Err(CoreError::MalformedPayload(format!(
                "entry for {} must be an object",
                id
            ))),
        }
    }
}

fn record_from_map(fields: Map<String, Value>) -> CoreResult<UserRecord> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Encodes a record as the single-entry envelope `{"<id>": <record>}`.
pub fn envelope(id: &str, record: &UserRecord) -> serde_json::Result<String> {
    let mut object = Map::new();
    object.insert(id.to_string(), serde_json::to_value(record)?);
    serde_json::to_string(&Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_explicit_form() {
        let update =
            SyncUpdate::parse(br#"{"id":"card1","pin":"1234","name":"Ada"}"#).unwrap();
        assert_eq!(update.id, "card1");
        assert_eq!(update.record.pin, "1234");
        assert_eq!(update.record.profile.get("name"), Some(&json!("Ada")));
        assert!(!update.record.profile.contains_key("id"));
    }

    #[test]
    fn test_parse_envelope_form() {
        let update = SyncUpdate::parse(br#"{"card2":{"pin":"9999"}}"#).unwrap();
        assert_eq!(update.id, "card2");
        assert_eq!(update.record, UserRecord::with_pin("9999"));
    }

    #[test]
    fn test_parse_numeric_pin() {
        let update = SyncUpdate::parse(br#"{"id":"card1","pin":1234}"#).unwrap();
        assert_eq!(update.record.pin, "1234");
    }

    #[test]
    fn test_parse_rejects_multi_key_without_id() {
        let err = SyncUpdate::parse(br#"{"a":{"pin":"1"},"b":{"pin":"2"}}"#).unwrap_err();
        assert_eq!(err, CoreError::MissingField("id".into()));
    }

    #[test]
    fn test_parse_rejects_empty_id() {
        let err = SyncUpdate::parse(br#"{"id":"  ","pin":"1"}"#).unwrap_err();
        assert_eq!(err, CoreError::MissingField("id".into()));
    }

    #[test]
    fn test_parse_rejects_non_object_entry() {
        let err = SyncUpdate::parse(br#"{"card1":"1234"}"#).unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            SyncUpdate::parse(b"not json").unwrap_err(),
            CoreError::MalformedPayload(_)
        ));
        assert!(matches!(
            SyncUpdate::parse(b"[1,2]").unwrap_err(),
            CoreError::MalformedPayload(_)
        ));
        assert!(matches!(
            SyncUpdate::parse(br#"{"id":7,"pin":"1"}"#).unwrap_err(),
            CoreError::MalformedPayload(_)
        ));
    }

    #[test]
    fn test_envelope_matches_peer_format() {
        let encoded = envelope("card1", &UserRecord::with_pin("1234")).unwrap();
        assert_eq!(encoded, r#"{"card1":{"pin":"1234"}}"#);
    }
}
