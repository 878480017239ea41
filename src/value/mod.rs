//! Storage-agnostic column values and their conversion to native parameters.
//!
//! A backup stores every column either as text or as raw bytes. The formats in
//! this module turn those values into the parameter type a target column needs
//! and back again.

pub mod extension;
pub mod format;
pub mod formats;
pub mod handle;
pub mod param;
pub mod types;

pub use extension::{ExtensionRegistry, VendorExtension};
pub use format::{ColumnRef, ValueFormat, ValueFormatRegistry};
pub use handle::{AccessKind, AccessOptions, ValueHandle, ValueHandleList, ValueHandleListBuilder};
pub use param::{Param, ParamType};
pub use types::SqlTypeCode;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Kind of encoding a backup uses for one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Binary,
}

/// One column value of a backed-up row.
///
/// SQL NULL is the `None` payload of its kind, so `Value::null(ValueType::String)`
/// and `Value::null(ValueType::Binary)` are distinct values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    String(Option<String>),
    Binary(Option<Vec<u8>>),
}

impl Value {
    pub fn null(value_type: ValueType) -> Self {
        match value_type {
            ValueType::String => Value::String(None),
            ValueType::Binary => Value::Binary(None),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Value::String(Some(value.into()))
    }

    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Value::Binary(Some(value.into()))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::String(None) | Value::Binary(None))
    }

    /// Text view of the value; binary payloads must be valid UTF-8.
    pub fn as_string(&self) -> Result<Option<Cow<'_, str>>, std::str::Utf8Error> {
        match self {
            Value::String(value) => Ok(value.as_deref().map(Cow::Borrowed)),
            Value::Binary(Some(bytes)) => std::str::from_utf8(bytes).map(|s| Some(Cow::Borrowed(s))),
            Value::Binary(None) => Ok(None),
        }
    }

    /// Byte view of the value; text payloads are returned as their UTF-8 bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(value) => value.as_deref().map(str::as_bytes),
            Value::Binary(value) => value.as_deref(),
        }
    }

    /// Re-encodes the value as the given kind without losing information.
    pub fn convert(self, value_type: ValueType) -> Result<Value, std::string::FromUtf8Error> {
        match (self, value_type) {
            (Value::String(value), ValueType::Binary) => {
                Ok(Value::Binary(value.map(String::into_bytes)))
            }
            (Value::Binary(value), ValueType::String) => {
                Ok(Value::String(value.map(String::from_utf8).transpose()?))
            }
            (value, _) => Ok(value),
        }
    }
}
