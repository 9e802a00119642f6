//! Field encoding
//!
//! ## Hash Layout
//! ```text
//! text      name        -> UTF-8 bytes
//! integer   age         -> "42"
//! float     score       -> "0.5"          (shortest round-trip decimal)
//! boolean   active      -> "1" | "0"
//! bytes     avatar      -> raw bytes
//! list      tags        -> "2"            (element count)
//!           tags.0      -> "a"
//!           tags.1      -> "b"
//! object    address     -> "1"            (presence marker)
//!           address.city-> ...            (sub-fields, recursively)
//! null      (no hash field at all)
//! ```

use std::collections::BTreeMap;

use crate::error::{OmError, Result};
use crate::metadata::{StorageKind, Value};

/// Header value marking a present nested object
const OBJECT_MARKER: &[u8] = b"1";

fn child(path: &str, name: &str) -> String {
    format!("{}.{}", path, name)
}

fn mismatch(path: &str, kind: &StorageKind, value: &Value) -> OmError {
    OmError::FieldType {
        field: path.to_string(),
        expected: kind_name(kind),
        found: value.kind_name(),
    }
}

fn kind_name(kind: &StorageKind) -> &'static str {
    match kind {
        StorageKind::Text => "text",
        StorageKind::Integer => "integer",
        StorageKind::Float => "float",
        StorageKind::Boolean => "boolean",
        StorageKind::Bytes => "bytes",
        StorageKind::List => "list",
        StorageKind::Object(_) => "object",
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a scalar value; `None` for `Null`
pub fn encode_scalar(path: &str, kind: &StorageKind, value: &Value) -> Result<Option<Vec<u8>>> {
    let bytes = match (kind, value) {
        (_, Value::Null) => return Ok(None),
        (StorageKind::Text, Value::Text(s)) => s.as_bytes().to_vec(),
        (StorageKind::Integer, Value::Integer(n)) => n.to_string().into_bytes(),
        (StorageKind::Float, Value::Float(f)) => f.to_string().into_bytes(),
        (StorageKind::Float, Value::Integer(n)) => (*n as f64).to_string().into_bytes(),
        (StorageKind::Boolean, Value::Boolean(b)) => if *b { b"1".to_vec() } else { b"0".to_vec() },
        (StorageKind::Bytes, Value::Bytes(b)) => b.clone(),
        (kind, value) => return Err(mismatch(path, kind, value)),
    };
    Ok(Some(bytes))
}

/// Encode one field (and any nested sub-fields) into `out`
pub fn encode_field(
    path: &str,
    kind: &StorageKind,
    value: &Value,
    out: &mut BTreeMap<String, Vec<u8>>,
) -> Result<()> {
    match (kind, value) {
        (_, Value::Null) => Ok(()),
        (StorageKind::List, Value::List(items)) => {
            out.insert(path.to_string(), items.len().to_string().into_bytes());
            for (i, item) in items.iter().enumerate() {
                out.insert(child(path, &i.to_string()), item.as_bytes().to_vec());
            }
            Ok(())
        }
        (StorageKind::Object(specs), Value::Object(map)) => {
            if let Some(unknown) = map.keys().find(|k| !specs.iter().any(|s| &s.name == *k)) {
                return Err(OmError::FieldType {
                    field: child(path, unknown),
                    expected: "declared sub-field",
                    found: "undeclared key",
                });
            }
            out.insert(path.to_string(), OBJECT_MARKER.to_vec());
            for spec in specs {
                if let Some(sub) = map.get(&spec.name) {
                    encode_field(&child(path, &spec.name), &spec.kind, sub, out)?;
                }
            }
            Ok(())
        }
        (StorageKind::List, other) | (StorageKind::Object(_), other) => {
            Err(mismatch(path, kind, other))
        }
        (scalar, value) => {
            if let Some(bytes) = encode_scalar(path, scalar, value)? {
                out.insert(path.to_string(), bytes);
            }
            Ok(())
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a scalar stored value
pub fn decode_scalar(key: &str, path: &str, kind: &StorageKind, raw: &[u8]) -> Result<Value> {
    let text = || {
        std::str::from_utf8(raw).map_err(|_| OmError::decode(key, path, "invalid UTF-8"))
    };

    match kind {
        StorageKind::Text => Ok(Value::Text(text()?.to_string())),
        StorageKind::Integer => {
            let s = text()?;
            s.parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| OmError::decode(key, path, format!("{:?} is not an integer", s)))
        }
        StorageKind::Float => {
            let s = text()?;
            s.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| OmError::decode(key, path, format!("{:?} is not a float", s)))
        }
        StorageKind::Boolean => match raw {
            b"1" => Ok(Value::Boolean(true)),
            b"0" => Ok(Value::Boolean(false)),
            _ => Err(OmError::decode(
                key,
                path,
                format!("{:?} is not a boolean", String::from_utf8_lossy(raw)),
            )),
        },
        StorageKind::Bytes => Ok(Value::Bytes(raw.to_vec())),
        StorageKind::List | StorageKind::Object(_) => Err(OmError::decode(
            key,
            path,
            "container field decoded as scalar",
        )),
    }
}

/// Decode one field (and any nested sub-fields) from a stored hash
pub fn decode_field(
    key: &str,
    path: &str,
    kind: &StorageKind,
    hash: &BTreeMap<String, Vec<u8>>,
) -> Result<Value> {
    let Some(raw) = hash.get(path) else {
        return Ok(Value::Null);
    };

    match kind {
        StorageKind::List => {
            let len = std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| OmError::decode(key, path, "invalid list length"))?;
            let mut items = Vec::with_capacity(len.min(1024));
            for i in 0..len {
                let item_path = child(path, &i.to_string());
                let item = hash
                    .get(&item_path)
                    .ok_or_else(|| OmError::decode(key, &item_path, "missing list element"))?;
                let item = String::from_utf8(item.clone())
                    .map_err(|_| OmError::decode(key, &item_path, "invalid UTF-8"))?;
                items.push(item);
            }
            Ok(Value::List(items))
        }
        StorageKind::Object(specs) => {
            if raw.as_slice() != OBJECT_MARKER {
                return Err(OmError::decode(key, path, "invalid object marker"));
            }
            let mut map = BTreeMap::new();
            for spec in specs {
                let value = decode_field(key, &child(path, &spec.name), &spec.kind, hash)?;
                map.insert(spec.name.clone(), value);
            }
            Ok(Value::Object(map))
        }
        scalar => decode_scalar(key, path, scalar, raw),
    }
}
