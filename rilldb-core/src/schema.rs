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

//! Schema descriptors
//!
//! A schema names the columns of a row and declares how many leading
//! columns form the sort key. The sort-key columns are encoded with the
//! order-preserving codec in [`crate::sort_key`] so that byte-wise
//! comparison of encoded prefixes matches value-wise comparison.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::error::{Result, RillError};

/// Column count most schemas stay under; columns are stored inline up to
/// this size.
pub const DEFAULT_COLUMN_NUM: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int64,
    Int32,
    Float64,
    Bool,
    String,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub id: u32,
    pub name: String,
    pub value_type: ValueType,
}

impl Column {
    pub fn new(id: u32, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            id,
            name: name.into(),
            value_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    columns: SmallVec<[Column; DEFAULT_COLUMN_NUM]>,
    schema_id: u64,
    sort_key_count: usize,
    // column id -> index
    index: HashMap<u32, usize>,
}

impl Schema {
    pub fn new(columns: Vec<Column>, schema_id: u64, sort_key_count: usize) -> Result<Self> {
        if sort_key_count == 0 || sort_key_count > columns.len() {
            return Err(RillError::InvalidArgument(format!(
                "sort key count {} out of range for {} columns",
                sort_key_count,
                columns.len()
            )));
        }
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if index.insert(column.id, i).is_some() {
                return Err(RillError::InvalidArgument(format!(
                    "duplicate column id {}",
                    column.id
                )));
            }
        }
        Ok(Self {
            columns: columns.into_iter().collect(),
            schema_id,
            sort_key_count,
            index,
        })
    }

    pub fn schema_id(&self) -> u64 {
        self.schema_id
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn sort_key_count(&self) -> usize {
        self.sort_key_count
    }

    pub fn column_at(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_by_id(&self, id: u32) -> Option<&Column> {
        self.index.get(&id).map(|&i| &self.columns[i])
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }
}
