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

//! Subtables: named handles over pooled pages.

use std::sync::Arc;

use rilldb_core::sort_key::{validate_key_str, KEY_DELIMITER};
use rilldb_core::{Result, RillError, Row, SortKey, TxnTs};

use crate::buffer_pool::PageSlot;
use crate::lock_table::LockTable;
use crate::options::Options;
use crate::page::{PageOps, RowView};

/// A logically independent keyspace backed by one page from the buffer
/// pool. Cheap to open; the slot is shared across transactions.
#[derive(Debug)]
pub struct SubTable {
    key: String,
    slot: Arc<PageSlot>,
}

impl SubTable {
    /// Resolve `subtable_key` through the pool in `opts.buffer_pool`.
    pub fn open(subtable_key: &str, opts: &Options) -> Result<SubTable> {
        validate_key_str(subtable_key)?;
        let pool = opts.buffer_pool.as_ref().ok_or_else(|| {
            RillError::InvalidArgument("opening a subtable requires a buffer pool".into())
        })?;
        Ok(SubTable {
            key: subtable_key.to_string(),
            slot: pool.slot(subtable_key),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_row(&self, row: Row, ts: TxnTs, opts: &Options) -> Result<()> {
        self.slot.page.set_row(row, ts, opts)
    }

    pub fn delete_row(&self, sort_key: &SortKey, ts: TxnTs, opts: &Options) -> Result<()> {
        self.slot.page.delete_row(sort_key, ts, opts)
    }

    pub fn get_row(&self, sort_key: &SortKey, read_ts: TxnTs, opts: &Options) -> Result<RowView> {
        self.slot.page.get_row(sort_key, read_ts, opts)
    }

    pub fn set_ts(&self, sort_key: &SortKey, new_ts: TxnTs, opts: &Options) -> Result<()> {
        self.slot.page.set_ts(sort_key, new_ts, opts)
    }

    /// Per-subtable lock table for the decentralized discipline.
    pub fn lock_table(&self) -> &LockTable {
        &self.slot.locks
    }

    /// Observable delta-chain length of the backing page.
    pub fn delta_chain_len(&self) -> usize {
        self.slot.page.delta_chain_len()
    }
}

/// Lock key for `(subtable_key, sort_key)`: the subtable key, a `#`, and
/// the sort key bytes. `#` never appears in either part.
pub fn lock_key(subtable_key: &str, sort_key: &SortKey) -> Vec<u8> {
    let mut key = Vec::with_capacity(subtable_key.len() + 1 + sort_key.len());
    key.extend_from_slice(subtable_key.as_bytes());
    key.push(KEY_DELIMITER);
    key.extend_from_slice(sort_key.as_bytes());
    key
}

/// The subtable part of a lock key.
pub fn subtable_of_lock_key(lock_key: &[u8]) -> Option<&str> {
    let split = lock_key.iter().position(|&b| b == KEY_DELIMITER)?;
    std::str::from_utf8(&lock_key[..split]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use rilldb_core::{Column, Schema, Value, ValueType};

    fn opts_with_pool() -> Options {
        Options::new().with_buffer_pool(Arc::new(BufferPool::new()))
    }

    #[test]
    fn test_open_requires_pool() {
        assert!(SubTable::open("t", &Options::new()).is_err());
        assert!(SubTable::open("t", &opts_with_pool()).is_ok());
    }

    #[test]
    fn test_open_rejects_reserved_bytes() {
        let opts = opts_with_pool();
        assert!(SubTable::open("bad#key", &opts).is_err());
        assert!(SubTable::open("bad\0key", &opts).is_err());
    }

    #[test]
    fn test_same_key_shares_page() {
        let opts = opts_with_pool();
        let schema = Schema::new(
            vec![
                Column::new(0, "id", ValueType::Int64),
                Column::new(1, "v", ValueType::String),
            ],
            0,
            1,
        )
        .unwrap();
        let a = SubTable::open("t", &opts).unwrap();
        let b = SubTable::open("t", &opts).unwrap();
        let row = Row::encode(&[Value::Int64(1), Value::String("x".into())], &schema).unwrap();
        let sk = row.sort_key();
        a.set_row(row, 1, &opts).unwrap();
        assert!(b.get_row(&sk, 1, &opts).is_ok());
    }

    #[test]
    fn test_lock_key_round_trip() {
        let schema = Schema::new(vec![Column::new(0, "id", ValueType::Int64)], 0, 1).unwrap();
        let sk = SortKey::from_values(&[Value::Int64(5)], &schema).unwrap();
        let key = lock_key("points", &sk);
        assert_eq!(subtable_of_lock_key(&key), Some("points"));
    }
}
