//! Property values
//!
//! This module defines:
//! - Value: the value held by one property of a persistent object
//! - PropertyKind: the declared type of a property
//!
//! ## Type Rules
//!
//! - No implicit coercions: a property of kind `Int` only accepts `Int` or `Null`
//! - `Int(1) != Float(1.0)`
//! - Floats compare by bit pattern, so `NaN == NaN` and `-0.0 != 0.0`. Values are
//!   compared to detect dirty objects, and a NaN property must not look dirty forever.

use crate::types::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared type of an entity property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PropertyKind {
    /// Boolean
    Bool = 1,
    /// 64-bit signed integer
    Int = 2,
    /// 64-bit float
    Float = 3,
    /// UTF-8 text
    Text = 4,
    /// Raw bytes
    Bytes = 5,
    /// UTC timestamp (microsecond precision)
    Timestamp = 6,
    /// Plain reference to another object (never traversed as ownership)
    Reference = 7,
}

impl PropertyKind {
    /// Convert to byte representation
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Try to create from byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(PropertyKind::Bool),
            2 => Some(PropertyKind::Int),
            3 => Some(PropertyKind::Float),
            4 => Some(PropertyKind::Text),
            5 => Some(PropertyKind::Bytes),
            6 => Some(PropertyKind::Timestamp),
            7 => Some(PropertyKind::Reference),
            _ => None,
        }
    }
}

/// Value of one property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absent value (valid for every kind)
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
    /// Reference to another object
    Reference(ObjectId),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Kind of this value, or None for `Null`
    pub fn kind(&self) -> Option<PropertyKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(PropertyKind::Bool),
            Value::Int(_) => Some(PropertyKind::Int),
            Value::Float(_) => Some(PropertyKind::Float),
            Value::Text(_) => Some(PropertyKind::Text),
            Value::Bytes(_) => Some(PropertyKind::Bytes),
            Value::Timestamp(_) => Some(PropertyKind::Timestamp),
            Value::Reference(_) => Some(PropertyKind::Reference),
        }
    }

    /// Check whether this value may be stored in a property of `kind`
    pub fn conforms_to(&self, kind: PropertyKind) -> bool {
        match self.kind() {
            None => true,
            Some(k) => k == kind,
        }
    }

    /// Check if this is Null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as i64 if this is an Int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as &str if this is Text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::Reference(v)
    }
}
