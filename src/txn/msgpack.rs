//! Canonical msgpack encoding for transactions.
//!
//! Maps are written with sorted keys and empty fields omitted, integers in
//! their smallest representation. Only the subset the ledger needs is
//! supported.

use super::TxnError;

/// A msgpack value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Uint(u64),
    Bin(Vec<u8>),
    Str(String),
    Array(Vec<Value>),
    Map(Map),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::Uint(v) => *v == 0,
            Value::Bin(v) => v.is_empty(),
            Value::Str(v) => v.is_empty(),
            Value::Array(v) => v.is_empty(),
            Value::Map(v) => v.entries.is_empty(),
        }
    }

    /// Encodes the value into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TxnError> {
        let mut buf = Vec::with_capacity(256);
        self.write(&mut buf)?;
        Ok(buf)
    }

    fn write(&self, buf: &mut Vec<u8>) -> Result<(), TxnError> {
        match self {
            Value::Uint(v) => {
                rmp::encode::write_uint(buf, *v).map_err(encode_error)?;
            }
            Value::Bin(v) => rmp::encode::write_bin(buf, v).map_err(encode_error)?,
            Value::Str(v) => rmp::encode::write_str(buf, v).map_err(encode_error)?,
            Value::Array(items) => {
                rmp::encode::write_array_len(buf, len_u32(items.len())?).map_err(encode_error)?;
                for item in items {
                    item.write(buf)?;
                }
            }
            Value::Map(map) => {
                rmp::encode::write_map_len(buf, len_u32(map.entries.len())?)
                    .map_err(encode_error)?;
                for (key, value) in &map.entries {
                    rmp::encode::write_str(buf, key).map_err(encode_error)?;
                    value.write(buf)?;
                }
            }
        }
        Ok(())
    }
}

/// A canonical map: sorted keys, no empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Map {
    entries: Vec<(&'static str, Value)>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field unless it is empty.
    pub fn field(mut self, key: &'static str, value: Value) -> Self {
        if !value.is_empty() {
            let at = self
                .entries
                .binary_search_by(|(k, _)| k.as_bytes().cmp(key.as_bytes()))
                .unwrap_or_else(|at| at);
            self.entries.insert(at, (key, value));
        }
        self
    }

    /// Adds a field when present.
    pub fn optional(self, key: &'static str, value: Option<Value>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Map(self)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }
}

fn len_u32(len: usize) -> Result<u32, TxnError> {
    u32::try_from(len).map_err(|_| TxnError::Encode(format!("length {} overflows u32", len)))
}

fn encode_error<E: std::fmt::Display>(e: E) -> TxnError {
    TxnError::Encode(e.to_string())
}
