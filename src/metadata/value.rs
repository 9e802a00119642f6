//! Dynamic field values
//!
//! The currency of the `Entity` accessor contract: entities hand out and
//! accept their declared fields as `Value`s.

use std::collections::BTreeMap;

use crate::error::{OmError, Result};

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    List(Vec<String>),
    /// Nested value object, keyed by sub-field name
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    fn mismatch(&self, field: &str, expected: &'static str) -> OmError {
        OmError::FieldType {
            field: field.to_string(),
            expected,
            found: self.kind_name(),
        }
    }
}

macro_rules! value_accessors {
    ($($variant:ident => $ty:ty, $expect:ident, $expect_opt:ident, $name:literal;)*) => {
        impl Value {$(
            #[doc = concat!("Unwrap a ", $name, " value for `field`")]
            pub fn $expect(self, field: &str) -> Result<$ty> {
                match self {
                    Value::$variant(v) => Ok(v),
                    other => Err(other.mismatch(field, $name)),
                }
            }

            #[doc = concat!("Unwrap an optional ", $name, " value; `Null` yields `None`")]
            pub fn $expect_opt(self, field: &str) -> Result<Option<$ty>> {
                match self {
                    Value::Null => Ok(None),
                    other => other.$expect(field).map(Some),
                }
            }
        )*}
    };
}

value_accessors! {
    Text => String, expect_text, expect_text_opt, "text";
    Integer => i64, expect_integer, expect_integer_opt, "integer";
    Float => f64, expect_float, expect_float_opt, "float";
    Boolean => bool, expect_boolean, expect_boolean_opt, "boolean";
    Bytes => Vec<u8>, expect_bytes, expect_bytes_opt, "bytes";
    List => Vec<String>, expect_list, expect_list_opt, "list";
    Object => BTreeMap<String, Value>, expect_object, expect_object_opt, "object";
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

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
