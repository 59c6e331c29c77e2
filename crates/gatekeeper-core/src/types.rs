//! # Domain Types
//!
//! Credential types shared by every layer of Gatekeeper.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  CredentialSnapshot = BTreeMap<RFID id, UserRecord>                    │
//! │                                                                         │
//! │  ┌─────────────────────────┐                                           │
//! │  │      UserRecord         │                                           │
//! │  │  ─────────────────────  │                                           │
//! │  │  pin      (string)      │   "1234"                                  │
//! │  │  profile  (pass-through)│   { "name": "Ada", "room": 12 }           │
//! │  └─────────────────────────┘                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Shape
//! A record serializes flat: `{"pin":"1234","name":"Ada"}`. The RFID id is
//! never a field of the record itself; it is the key it is stored under.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// User Record
// =============================================================================

/// A single user's credential record.
///
/// Identity lives outside the record (the snapshot key), so an update can
/// replace every field wholesale without touching who the record belongs to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    /// PIN code compared by exact string equality.
    ///
    /// Remote directories sometimes store this as a number; it is
    /// normalized to its decimal string on the way in.
    #[serde(default, deserialize_with = "deserialize_pin")]
    pub pin: String,

    /// Opaque profile fields, passed through untouched.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl UserRecord {
    /// Creates a record with only a PIN.
    pub fn with_pin(pin: impl Into<String>) -> Self {
        UserRecord {
            pin: pin.into(),
            profile: Map::new(),
        }
    }

    /// Adds a profile field (builder style).
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.profile.insert(key.into(), value.into());
        self
    }

    /// Returns true if this record can ever pass a PIN check.
    pub fn has_pin(&self) -> bool {
        !self.pin.is_empty()
    }
}

fn deserialize_pin<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(pin) => Ok(pin),
        Value::Number(pin) => Ok(pin.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "pin must be a string or number, got {}",
            other
        ))),
    }
}

// =============================================================================
// Credential Snapshot
// =============================================================================

/// Full local copy of the remote credential directory, keyed by RFID id.
///
/// A `BTreeMap` keeps iteration (and therefore persisted and uploaded
/// order) deterministic.
pub type CredentialSnapshot = BTreeMap<String, UserRecord>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_flat() {
        let record = UserRecord::with_pin("1234").field("name", "Ada");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"pin": "1234", "name": "Ada"}));
    }

    #[test]
    fn test_numeric_pin_normalized() {
        let record: UserRecord = serde_json::from_value(json!({"pin": 4321})).unwrap();
        assert_eq!(record.pin, "4321");
    }

    #[test]
    fn test_missing_pin_is_empty() {
        let record: UserRecord = serde_json::from_value(json!({"name": "Ada"})).unwrap();
        assert!(!record.has_pin());
        assert_eq!(record.profile.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn test_invalid_pin_type_rejected() {
        let result: Result<UserRecord, _> = serde_json::from_value(json!({"pin": [1, 2]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_order_is_deterministic() {
        let mut snapshot = CredentialSnapshot::new();
        snapshot.insert("b".into(), UserRecord::with_pin("2"));
        snapshot.insert("a".into(), UserRecord::with_pin("1"));
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"a":{"pin":"1"},"b":{"pin":"2"}}"#);
    }
}
