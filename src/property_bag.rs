//! An ordered, mergeable key/value container that backs every context entity and event.
use std::{fmt, ops::AddAssign};

use derive_more::From;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A value that can be stored in a [`PropertyBag`].
#[derive(Debug, Clone, PartialEq, From)]
pub enum PropertyValue {
    /// A string. Empty strings are never stored.
    String(String),
    /// A floating point number.
    Number(f64),
    /// An integer.
    Integer(i64),
    /// A boolean.
    Boolean(bool),
    /// A nested bag, stored as a JSON object.
    Bag(PropertyBag),
    /// A list of strings, stored as a JSON array.
    List(Vec<String>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<&String> for PropertyValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<PropertyValue> for Value {
    fn from(value: PropertyValue) -> Value {
        match value {
            PropertyValue::String(s) => Value::String(s),
            PropertyValue::Number(n) => {
                // NaN and infinities have no JSON representation.
                serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
            }
            PropertyValue::Integer(i) => Value::Number(i.into()),
            PropertyValue::Boolean(b) => Value::Bool(b),
            PropertyValue::Bag(bag) => Value::Object(bag.0),
            PropertyValue::List(list) => Value::Array(list.into_iter().map(Value::String).collect()),
        }
    }
}

/// Ordered mapping from string keys to JSON-compatible values.
///
/// Two rules hold for every bag:
/// - empty strings are never stored. Setting a key to `""` removes it.
/// - merging (`+=`) overwrites matching keys with the right-hand side and keeps everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag(Map<String, Value>);

impl PropertyBag {
    /// Create an empty bag.
    pub fn new() -> PropertyBag {
        PropertyBag::default()
    }

    /// Build a bag from a JSON value. Returns `None` if `value` is not an object.
    pub fn from_json(value: Value) -> Option<PropertyBag> {
        match value {
            Value::Object(map) => Some(PropertyBag(map)),
            _ => None,
        }
    }

    /// Set `key` to `value`, replacing any previous value. An empty string removes the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> &mut Self {
        let key = key.into();
        match value.into() {
            PropertyValue::String(s) if s.is_empty() => {
                self.0.shift_remove(&key);
            }
            value => {
                self.0.insert(key, value.into());
            }
        }
        self
    }

    /// Set a raw JSON value. Empty strings remove the key, like [`PropertyBag::set`].
    pub fn set_json(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        let key = key.into();
        if value.as_str().is_some_and(str::is_empty) {
            self.0.shift_remove(&key);
        } else {
            self.0.insert(key, value);
        }
        self
    }

    /// Value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String under `key`. `None` if absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Number under `key`.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Boolean under `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// `true` if `key` is present.
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove `key`, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if the bag has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge `other` into this bag. Keys present in both take the value from `other`.
    pub fn merge(&mut self, other: &PropertyBag) -> &mut Self {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
        self
    }

    /// JSON object representation of the bag.
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Convert into a JSON object without copying.
    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }
}

impl AddAssign<&PropertyBag> for PropertyBag {
    fn add_assign(&mut self, other: &PropertyBag) {
        self.merge(other);
    }
}

impl AddAssign<PropertyBag> for PropertyBag {
    fn add_assign(&mut self, other: PropertyBag) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }
}

impl From<PropertyBag> for Value {
    fn from(bag: PropertyBag) -> Value {
        bag.into_json()
    }
}

impl fmt::Display for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Serializing a map of JSON values cannot fail.
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
