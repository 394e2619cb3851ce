// Copyright 2026 RillDB Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Order-preserving composite key encoding
//!
//! A sort key is the canonical byte form of the leading sort-key columns of
//! a row. Encoded keys compare byte-wise in the same order as the source
//! values compare column-wise:
//!
//! - `i64`/`i32`: sign bit flipped, big-endian
//! - `f64`: IEEE-754 total-order transform, big-endian
//! - `bool`: one byte
//! - `String`: raw UTF-8 followed by a `0x00` terminator
//!
//! Strings used in keys must not contain `0x00` (the terminator) or `#`
//! (the lock-key delimiter).

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, RillError};
use crate::row::Value;
use crate::schema::{Schema, ValueType};

/// Reserved byte separating the subtable key from the sort key in lock keys.
pub const KEY_DELIMITER: u8 = b'#';

const STRING_TERMINATOR: u8 = 0x00;

/// Canonical byte form of a row's leading sort-key columns. Equality, order,
/// and hash are byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey(Bytes);

impl SortKey {
    /// Encode `values` (one per sort-key column) under `schema`.
    pub fn from_values(values: &[Value], schema: &Schema) -> Result<SortKey> {
        if values.len() != schema.sort_key_count() {
            return Err(RillError::InvalidArgument(format!(
                "expected {} sort key values, got {}",
                schema.sort_key_count(),
                values.len()
            )));
        }
        let mut buf = BytesMut::new();
        for (i, value) in values.iter().enumerate() {
            let column = schema
                .column_at(i)
                .ok_or_else(|| RillError::Internal("sort key column out of range".into()))?;
            encode_key_value(&mut buf, value, column.value_type)?;
        }
        Ok(SortKey(buf.freeze()))
    }

    /// Wrap already-encoded key bytes.
    pub fn from_bytes(bytes: Bytes) -> SortKey {
        SortKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reject strings that would corrupt key encoding or lock-key framing.
pub fn validate_key_str(s: &str) -> Result<()> {
    if s.bytes().any(|b| b == STRING_TERMINATOR || b == KEY_DELIMITER) {
        return Err(RillError::InvalidArgument(
            "key strings must not contain 0x00 or '#'".into(),
        ));
    }
    Ok(())
}

pub(crate) fn encode_key_value(
    buf: &mut BytesMut,
    value: &Value,
    expected: ValueType,
) -> Result<()> {
    if value.value_type() != expected {
        return Err(RillError::InvalidArgument(format!(
            "sort key value type {:?} does not match column type {:?}",
            value.value_type(),
            expected
        )));
    }
    match value {
        Value::Int64(v) => {
            let mut raw = [0u8; 8];
            BigEndian::write_u64(&mut raw, (*v as u64) ^ (1 << 63));
            buf.put_slice(&raw);
        }
        Value::Int32(v) => {
            let mut raw = [0u8; 4];
            BigEndian::write_u32(&mut raw, (*v as u32) ^ (1 << 31));
            buf.put_slice(&raw);
        }
        Value::Float64(v) => {
            let bits = v.to_bits();
            // total order: negatives invert entirely, positives flip the sign
            let ordered = if bits & (1 << 63) != 0 {
                !bits
            } else {
                bits | (1 << 63)
            };
            let mut raw = [0u8; 8];
            BigEndian::write_u64(&mut raw, ordered);
            buf.put_slice(&raw);
        }
        Value::Bool(v) => buf.put_u8(*v as u8),
        Value::String(s) => {
            validate_key_str(s)?;
            buf.put_slice(s.as_bytes());
            buf.put_u8(STRING_TERMINATOR);
        }
    }
    Ok(())
}

/// Decode one key column from `buf`, returning the value and the number of
/// bytes consumed.
pub(crate) fn decode_key_value(buf: &[u8], ty: ValueType) -> Result<(Value, usize)> {
    let short = || RillError::Serialization("truncated sort key".into());
    match ty {
        ValueType::Int64 => {
            if buf.len() < 8 {
                return Err(short());
            }
            let raw = BigEndian::read_u64(&buf[..8]) ^ (1 << 63);
            Ok((Value::Int64(raw as i64), 8))
        }
        ValueType::Int32 => {
            if buf.len() < 4 {
                return Err(short());
            }
            let raw = BigEndian::read_u32(&buf[..4]) ^ (1 << 31);
            Ok((Value::Int32(raw as i32), 4))
        }
        ValueType::Float64 => {
            if buf.len() < 8 {
                return Err(short());
            }
            let ordered = BigEndian::read_u64(&buf[..8]);
            let bits = if ordered & (1 << 63) != 0 {
                ordered & !(1 << 63)
            } else {
                !ordered
            };
            Ok((Value::Float64(f64::from_bits(bits)), 8))
        }
        ValueType::Bool => {
            if buf.is_empty() {
                return Err(short());
            }
            Ok((Value::Bool(buf[0] != 0), 1))
        }
        ValueType::String => {
            let end = buf
                .iter()
                .position(|&b| b == STRING_TERMINATOR)
                .ok_or_else(short)?;
            let s = std::str::from_utf8(&buf[..end])
                .map_err(|e| RillError::Serialization(format!("invalid key utf-8: {e}")))?;
            Ok((Value::String(s.to_string()), end + 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn two_key_schema() -> Schema {
        Schema::new(
            vec![
                Column::new(0, "point_id", ValueType::Int64),
                Column::new(1, "point_type", ValueType::Int32),
                Column::new(2, "value", ValueType::String),
            ],
            0,
            2,
        )
        .unwrap()
    }

    fn key(id: i64, ty: i32) -> SortKey {
        SortKey::from_values(
            &[Value::Int64(id), Value::Int32(ty)],
            &two_key_schema(),
        )
        .unwrap()
    }

    #[test]
    fn test_int_key_ordering() {
        assert!(key(-5, 0) < key(0, 0));
        assert!(key(0, 0) < key(0, 1));
        assert!(key(0, 1) < key(1, -3));
        assert!(key(i64::MIN, 0) < key(i64::MAX, 0));
    }

    #[test]
    fn test_key_equality() {
        assert_eq!(key(7, 7), key(7, 7));
        assert_ne!(key(7, 7), key(7, 8));
    }

    #[test]
    fn test_float_total_order() {
        let schema = Schema::new(
            vec![Column::new(0, "score", ValueType::Float64)],
            1,
            1,
        )
        .unwrap();
        let k = |v: f64| SortKey::from_values(&[Value::Float64(v)], &schema).unwrap();
        assert!(k(-1.5) < k(-0.5));
        assert!(k(-0.5) < k(0.0));
        assert!(k(0.0) < k(2.25));
    }

    #[test]
    fn test_string_key_rejects_reserved_bytes() {
        let schema = Schema::new(
            vec![Column::new(0, "name", ValueType::String)],
            2,
            1,
        )
        .unwrap();
        assert!(SortKey::from_values(&[Value::String("a#b".into())], &schema).is_err());
        assert!(SortKey::from_values(&[Value::String("a\0b".into())], &schema).is_err());
        assert!(SortKey::from_values(&[Value::String("plain".into())], &schema).is_ok());
    }

    #[test]
    fn test_decode_round_trip() {
        let k = key(-42, 7);
        let buf = k.as_bytes();
        let (v0, n0) = decode_key_value(buf, ValueType::Int64).unwrap();
        let (v1, n1) = decode_key_value(&buf[n0..], ValueType::Int32).unwrap();
        assert_eq!(v0, Value::Int64(-42));
        assert_eq!(v1, Value::Int32(7));
        assert_eq!(n0 + n1, buf.len());
    }
}
