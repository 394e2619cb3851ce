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

//! Self-describing row records
//!
//! A row is an immutable byte record whose leading bytes are the
//! order-preserving sort-key prefix, so pages can compare and slice keys
//! without consulting the schema. Layout:
//!
//! ```text
//! [u32 total_len][u64 schema_id][u16 sort_key_len][sort-key bytes][tail]
//! ```
//!
//! The tail holds the non-sort-key columns in schema order, each as a
//! one-byte type tag followed by its payload. Sort-key columns are
//! recovered by decoding the prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, RillError};
use crate::schema::{Schema, ValueType};
use crate::sort_key::{decode_key_value, encode_key_value, SortKey};

const ROW_HEADER_LEN: usize = 4 + 8 + 2;

const TAG_INT64: u8 = 1;
const TAG_INT32: u8 = 2;
const TAG_FLOAT64: u8 = 3;
const TAG_BOOL: u8 = 4;
const TAG_STRING: u8 = 5;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int64(i64),
    Int32(i32),
    Float64(f64),
    Bool(bool),
    String(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int64(_) => ValueType::Int64,
            Value::Int32(_) => ValueType::Int32,
            Value::Float64(_) => ValueType::Float64,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
        }
    }
}

/// Immutable, self-describing row. Cloning is cheap (shared bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(Bytes);

impl Row {
    /// Encode `values` (one per schema column, in schema order).
    pub fn encode(values: &[Value], schema: &Schema) -> Result<Row> {
        if values.len() != schema.column_count() {
            return Err(RillError::InvalidArgument(format!(
                "expected {} values, got {}",
                schema.column_count(),
                values.len()
            )));
        }
        let mut key_buf = BytesMut::new();
        for i in 0..schema.sort_key_count() {
            let column = schema
                .column_at(i)
                .ok_or_else(|| RillError::Internal("sort key column out of range".into()))?;
            encode_key_value(&mut key_buf, &values[i], column.value_type)?;
        }
        if key_buf.len() > u16::MAX as usize {
            return Err(RillError::InvalidArgument("sort key too long".into()));
        }

        let mut tail = BytesMut::new();
        for i in schema.sort_key_count()..schema.column_count() {
            let column = schema
                .column_at(i)
                .ok_or_else(|| RillError::Internal("column out of range".into()))?;
            encode_tail_value(&mut tail, &values[i], column.value_type)?;
        }

        let total = ROW_HEADER_LEN + key_buf.len() + tail.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32_le(total as u32);
        buf.put_u64_le(schema.schema_id());
        buf.put_u16_le(key_buf.len() as u16);
        buf.put_slice(&key_buf);
        buf.put_slice(&tail);
        Ok(Row(buf.freeze()))
    }

    /// Wrap raw row bytes, validating the length header.
    pub fn from_bytes(bytes: Bytes) -> Result<Row> {
        if bytes.len() < ROW_HEADER_LEN {
            return Err(RillError::Serialization("row too short".into()));
        }
        let total = (&bytes[..4]).get_u32_le() as usize;
        if total != bytes.len() {
            return Err(RillError::Serialization(format!(
                "row length header {} does not match buffer length {}",
                total,
                bytes.len()
            )));
        }
        let key_len = (&bytes[12..14]).get_u16_le() as usize;
        if ROW_HEADER_LEN + key_len > bytes.len() {
            return Err(RillError::Serialization("row sort key out of range".into()));
        }
        Ok(Row(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn total_len(&self) -> usize {
        self.0.len()
    }

    pub fn schema_id(&self) -> u64 {
        (&self.0[4..12]).get_u64_le()
    }

    fn sort_key_len(&self) -> usize {
        (&self.0[12..14]).get_u16_le() as usize
    }

    /// The row's sort-key prefix; shares the row's backing bytes.
    pub fn sort_key(&self) -> SortKey {
        SortKey::from_bytes(self.0.slice(ROW_HEADER_LEN..ROW_HEADER_LEN + self.sort_key_len()))
    }

    /// Extract the column at `index` (schema order).
    pub fn get(&self, index: usize, schema: &Schema) -> Result<Value> {
        let column = schema
            .column_at(index)
            .ok_or_else(|| RillError::InvalidArgument(format!("no column at index {index}")))?;
        if index < schema.sort_key_count() {
            let mut key = &self.0[ROW_HEADER_LEN..ROW_HEADER_LEN + self.sort_key_len()];
            for i in 0..=index {
                let ty = schema
                    .column_at(i)
                    .ok_or_else(|| RillError::Internal("sort key column out of range".into()))?
                    .value_type;
                let (value, consumed) = decode_key_value(key, ty)?;
                if i == index {
                    return Ok(value);
                }
                key = &key[consumed..];
            }
            Err(RillError::Internal("sort key decode fell through".into()))
        } else {
            let mut tail = &self.0[ROW_HEADER_LEN + self.sort_key_len()..];
            for i in schema.sort_key_count()..=index {
                let (value, consumed) = decode_tail_value(tail)?;
                if i == index {
                    if value.value_type() != column.value_type {
                        return Err(RillError::Serialization(format!(
                            "column {} has type {:?}, schema says {:?}",
                            index,
                            value.value_type(),
                            column.value_type
                        )));
                    }
                    return Ok(value);
                }
                tail = &tail[consumed..];
            }
            Err(RillError::Internal("tail decode fell through".into()))
        }
    }
}

fn encode_tail_value(buf: &mut BytesMut, value: &Value, expected: ValueType) -> Result<()> {
    if value.value_type() != expected {
        return Err(RillError::InvalidArgument(format!(
            "value type {:?} does not match column type {:?}",
            value.value_type(),
            expected
        )));
    }
    match value {
        Value::Int64(v) => {
            buf.put_u8(TAG_INT64);
            buf.put_i64_le(*v);
        }
        Value::Int32(v) => {
            buf.put_u8(TAG_INT32);
            buf.put_i32_le(*v);
        }
        Value::Float64(v) => {
            buf.put_u8(TAG_FLOAT64);
            buf.put_u64_le(v.to_bits());
        }
        Value::Bool(v) => {
            buf.put_u8(TAG_BOOL);
            buf.put_u8(*v as u8);
        }
        Value::String(s) => {
            if s.len() > u32::MAX as usize {
                return Err(RillError::InvalidArgument("string value too long".into()));
            }
            buf.put_u8(TAG_STRING);
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }
    }
    Ok(())
}

fn decode_tail_value(buf: &[u8]) -> Result<(Value, usize)> {
    let short = || RillError::Serialization("truncated row tail".into());
    if buf.is_empty() {
        return Err(short());
    }
    let tag = buf[0];
    let body = &buf[1..];
    match tag {
        TAG_INT64 => {
            if body.len() < 8 {
                return Err(short());
            }
            Ok((Value::Int64((&body[..8]).get_i64_le()), 9))
        }
        TAG_INT32 => {
            if body.len() < 4 {
                return Err(short());
            }
            Ok((Value::Int32((&body[..4]).get_i32_le()), 5))
        }
        TAG_FLOAT64 => {
            if body.len() < 8 {
                return Err(short());
            }
            Ok((Value::Float64(f64::from_bits((&body[..8]).get_u64_le())), 9))
        }
        TAG_BOOL => {
            if body.is_empty() {
                return Err(short());
            }
            Ok((Value::Bool(body[0] != 0), 2))
        }
        TAG_STRING => {
            if body.len() < 4 {
                return Err(short());
            }
            let len = (&body[..4]).get_u32_le() as usize;
            if body.len() < 4 + len {
                return Err(short());
            }
            let s = std::str::from_utf8(&body[4..4 + len])
                .map_err(|e| RillError::Serialization(format!("invalid row utf-8: {e}")))?;
            Ok((Value::String(s.to_string()), 1 + 4 + len))
        }
        other => Err(RillError::Serialization(format!(
            "unknown column tag {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn point_schema() -> Schema {
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

    #[test]
    fn test_encode_extract_round_trip() {
        let schema = point_schema();
        let row = Row::encode(
            &[
                Value::Int64(7),
                Value::Int32(-3),
                Value::String("hello".into()),
            ],
            &schema,
        )
        .unwrap();
        assert_eq!(row.get(0, &schema).unwrap(), Value::Int64(7));
        assert_eq!(row.get(1, &schema).unwrap(), Value::Int32(-3));
        assert_eq!(row.get(2, &schema).unwrap(), Value::String("hello".into()));
        assert_eq!(row.schema_id(), 0);
        assert_eq!(row.total_len(), row.as_bytes().len());
    }

    #[test]
    fn test_sort_key_matches_standalone_encoding() {
        let schema = point_schema();
        let row = Row::encode(
            &[Value::Int64(1), Value::Int32(2), Value::String("x".into())],
            &schema,
        )
        .unwrap();
        let key = SortKey::from_values(&[Value::Int64(1), Value::Int32(2)], &schema).unwrap();
        assert_eq!(row.sort_key(), key);
    }

    #[test]
    fn test_from_bytes_validates_header() {
        let schema = point_schema();
        let row = Row::encode(
            &[Value::Int64(1), Value::Int32(2), Value::String("x".into())],
            &schema,
        )
        .unwrap();
        let bytes = Bytes::copy_from_slice(row.as_bytes());
        assert!(Row::from_bytes(bytes.clone()).is_ok());
        assert!(Row::from_bytes(bytes.slice(..bytes.len() - 1)).is_err());
        assert!(Row::from_bytes(Bytes::from_static(b"xy")).is_err());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let schema = point_schema();
        let err = Row::encode(
            &[Value::Int32(1), Value::Int32(2), Value::String("x".into())],
            &schema,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_wide_schema_round_trip() {
        let schema = Schema::new(
            vec![
                Column::new(0, "k", ValueType::String),
                Column::new(1, "f", ValueType::Float64),
                Column::new(2, "b", ValueType::Bool),
                Column::new(3, "n", ValueType::Int64),
            ],
            9,
            1,
        )
        .unwrap();
        let row = Row::encode(
            &[
                Value::String("key".into()),
                Value::Float64(2.5),
                Value::Bool(true),
                Value::Int64(-1),
            ],
            &schema,
        )
        .unwrap();
        assert_eq!(row.get(0, &schema).unwrap(), Value::String("key".into()));
        assert_eq!(row.get(1, &schema).unwrap(), Value::Float64(2.5));
        assert_eq!(row.get(2, &schema).unwrap(), Value::Bool(true));
        assert_eq!(row.get(3, &schema).unwrap(), Value::Int64(-1));
        assert_eq!(row.schema_id(), 9);
    }
}
