//! # Run Status Fields
//!
//! Status a controller reports for one run: start and completion times plus
//! an open-ended bag of additional fields.
//!
//! ## Additional Fields
//!
//! The bag is held in serialized JSON form so it round-trips untouched
//! through storage, and is read and written through a typed key-value API:
//!
//! | Operation | Absent key | Invalid stored JSON |
//! |-----------|------------|---------------------|
//! | [`AdditionalFields::get`] | `Ok(None)` | error |
//! | [`AdditionalFields::set`] | inserts | error |
//! | [`AdditionalFields::clear`] | no-op | error |
//!
//! Stored JSON must be an object; anything else is an error on access.
//! Keys are written in sorted order.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// =============================================================================
// Additional Fields
// =============================================================================

/// Serialized JSON object of controller-defined fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalFields {
    raw: String,
}

impl AdditionalFields {
    /// Wraps already-serialized JSON without validating it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The serialized form. Empty when nothing was ever set.
    pub fn as_raw(&self) -> &str {
        &self.raw
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.object().map(|m| m.is_empty()).unwrap_or(false)
    }

    /// Returns the raw JSON value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] if the stored JSON is invalid or not an object.
    pub fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.object()?.remove(key))
    }

    /// Returns the field under `key` decoded as `T`.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] if the stored JSON is invalid, not an object,
    /// or the field does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_value(key)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::from)
    }

    /// Sets `key` to `value`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] if the stored JSON is invalid or `value`
    /// cannot be serialized.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let mut fields = self.object()?;
        fields.insert(key.to_string(), serde_json::to_value(value)?);
        self.store(&fields)
    }

    /// Removes `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::Serialization`] if the stored JSON is invalid.
    pub fn clear(&mut self, key: &str) -> Result<()> {
        let mut fields = self.object()?;
        if fields.remove(key).is_some() {
            self.store(&fields)?;
        }
        Ok(())
    }

    fn object(&self) -> Result<Map<String, Value>> {
        if self.raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&self.raw)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Serialization(format!(
                "additional fields must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn store(&mut self, fields: &Map<String, Value>) -> Result<()> {
        self.raw = serde_json::to_string(fields)?;
        Ok(())
    }
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

impl Serialize for AdditionalFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.object()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AdditionalFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(Self {
            raw: value.to_string(),
        })
    }
}

// =============================================================================
// Run Status Fields
// =============================================================================

/// Timing and additional fields of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusFields {
    /// Controller-defined fields.
    #[serde(default, skip_serializing_if = "AdditionalFields::is_empty")]
    pub additional_fields: AdditionalFields,
    /// When the run actually started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

impl RunStatusFields {
    /// True once a start time has been recorded.
    pub fn has_started(&self) -> bool {
        self.start_time.is_some()
    }

    /// True once a completion time has been recorded.
    pub fn is_done(&self) -> bool {
        self.completion_time.is_some()
    }

    /// Records `at` as the start time unless one is already set.
    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.start_time.get_or_insert(at);
    }

    /// Records `at` as the completion time.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.completion_time = Some(at);
    }

    /// Elapsed time between start and completion, when both are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completion_time? - self.start_time?)
    }
}
