//! Runtime values for encoding/decoding (codec representation).

use std::collections::BTreeMap;

use crate::wire::WireType;

/// A single value (scalar or compound).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Entry order is preserved on the wire.
    Map(Vec<(Value, Value)>),
    /// An enum constant by its wire tag, never its ordinal.
    Enum(u32),
    Message(MessageValue),
}

/// Decoded message: named fields plus any unknown fields the decode policy
/// chose to preserve.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageValue {
    pub fields: BTreeMap<String, Value>,
    pub unknown: Vec<UnknownField>,
}

/// A raw field retained from decode for forward-compatible round-tripping.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownField {
    pub tag: u32,
    pub wire_type: WireType,
    /// Payload bytes exactly as read, excluding the key.
    pub bytes: Vec<u8>,
}

impl MessageValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl Value {
    pub fn message(fields: Vec<(&str, Value)>) -> Value {
        let mut m = MessageValue::new();
        for (name, value) in fields {
            m.fields.insert(name.to_string(), value);
        }
        Value::Message(m)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Bool(b) => Some(*b as u64),
            Value::U32(x) => Some(*x as u64),
            Value::U64(x) => Some(*x),
            Value::I32(x) => Some(*x as u64),
            Value::I64(x) => Some(*x as u64),
            Value::Enum(t) => Some(*t as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::I32(x) => Some(*x as i64),
            Value::I64(x) => Some(*x),
            Value::U32(x) => Some(*x as i64),
            Value::U64(x) => Some(*x as i64),
            Value::Enum(t) => Some(*t as i64),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(x) => Some(*x),
            Value::F32(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageValue> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }
}
