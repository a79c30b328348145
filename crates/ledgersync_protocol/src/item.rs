//! Items exchanged with the remote collection.

use crate::error::{ItemError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io;

/// Field holding an item's identity key.
pub const ID_KEY: &str = "id";

/// Prefix marking reserved fields. A replace never copies them.
pub const RESERVED_PREFIX: char = '_';

/// What a raw item asks for, judged from its shape alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemIntent {
    /// No identity key: a brand-new record.
    Create,
    /// Identity key plus other fields: an update of an existing record.
    Replace,
    /// Identity key and nothing else: removal of an existing record.
    Delete,
}

/// A single record of a remote document collection.
///
/// An `Item` is an opaque JSON object. The only field the sync layer
/// interprets is [`ID_KEY`]:
///
/// - absent: the item is pending creation
/// - present alone: the item is pending deletion
/// - present with other fields: the item is pending replacement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(Map<String, Value>);

impl Item {
    /// Creates an empty item.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Creates an item carrying only an identity key.
    ///
    /// This is the deletion marker shape.
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(ID_KEY.to_string(), Value::String(id.into()));
        Self(map)
    }

    /// Wraps an existing JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Converts a JSON value, which must be an object.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ItemError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Sets a field, consuming and returning the item.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns a field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the identity key, if it is a non-empty string.
    pub fn id(&self) -> Option<&str> {
        self.0
            .get(ID_KEY)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Returns the identity key or [`ItemError::MissingId`].
    pub fn require_id(&self) -> ProtocolResult<&str> {
        self.id().ok_or(ItemError::MissingId)
    }

    /// Returns true if the only field is the identity key.
    pub fn is_tombstone(&self) -> bool {
        self.0.len() == 1 && self.0.contains_key(ID_KEY)
    }

    /// Classifies the item by shape.
    pub fn intent(&self) -> ItemIntent {
        if self.is_tombstone() {
            ItemIntent::Delete
        } else if self.id().is_some() {
            ItemIntent::Replace
        } else {
            ItemIntent::Create
        }
    }

    /// Returns true if `key` names a field that a replace must not touch.
    pub fn is_reserved(key: &str) -> bool {
        key == ID_KEY || key.starts_with(RESERVED_PREFIX)
    }

    /// Copies every non-reserved field of `patch` over this item.
    pub fn merge_from(&mut self, patch: &Item) {
        for (key, value) in patch.0.iter().filter(|(k, _)| !Self::is_reserved(k)) {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns the length of the compact JSON encoding, in bytes.
    ///
    /// This is the size estimate the regulator charges against its budget.
    pub fn encoded_len(&self) -> usize {
        let mut counter = ByteCounter(0);
        match serde_json::to_writer(&mut counter, &self.0) {
            Ok(()) => counter.0,
            // A string-keyed JSON map always serializes.
            Err(_) => 0,
        }
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the item has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the item, returning the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Item {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Item> for Value {
    fn from(item: Item) -> Self {
        Value::Object(item.0)
    }
}

impl TryFrom<Value> for Item {
    type Error = ItemError;

    fn try_from(value: Value) -> ProtocolResult<Self> {
        Self::from_value(value)
    }
}

/// Sink that only counts the bytes written to it.
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

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
