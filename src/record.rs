//! Record and key types shared by every collection.
//!
//! A [`Record`] is a JSON object. The store owns two of its fields:
//! `createdAt` (set once, on first write) and `updatedAt` (set on every write),
//! both RFC 3339 UTC timestamps with millisecond precision so they sort
//! lexically.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Primary key of a record.
///
/// `Seq` keys are encoded big-endian so storage order equals sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Seq(u64),
    Text(String),
}

impl Key {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Key::Seq(seq) => seq.to_be_bytes().to_vec(),
            Key::Text(text) => text.as_bytes().to_vec(),
        }
    }

    pub fn as_seq(&self) -> Option<u64> {
        match self {
            Key::Seq(seq) => Some(*seq),
            Key::Text(_) => None,
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Seq(seq) => write!(f, "{seq}"),
            Key::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Key::Seq(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn created_at(&self) -> Option<&str> {
        self.get_str(CREATED_AT)
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.get_str(UPDATED_AT)
    }

    /// Applies write timestamps. A missing `createdAt` is taken from the
    /// record being replaced, or `now` on first write.
    pub fn stamp(&mut self, existing: Option<&Record>, now: &str) {
        let has_created_at = matches!(self.get(CREATED_AT), Some(v) if !v.is_null());
        if !has_created_at {
            let created_at = existing
                .and_then(|previous| previous.get(CREATED_AT))
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::String(now.to_string()));
            self.0.insert(CREATED_AT.to_string(), created_at);
        }
        self.0
            .insert(UPDATED_AT.to_string(), Value::String(now.to_string()));
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(format!("record must be a JSON object, got {other}")),
        }
    }
}

/// Time source for record timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Sortable textual form used for `createdAt` / `updatedAt`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
