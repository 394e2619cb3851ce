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

//! RillDB Core
//!
//! Fundamental types shared by the RillDB storage engine:
//!
//! - **Timestamps**: 64-bit transaction timestamps with an intent-lock bit
//! - **Schemas**: column descriptors with a sort-key prefix
//! - **Sort keys**: order-preserving composite key encoding
//! - **Rows**: immutable, self-describing byte records

pub mod error;
pub mod row;
pub mod schema;
pub mod sort_key;
pub mod ts;

pub use error::{Result, RillError};
pub use row::{Row, Value};
pub use schema::{Column, Schema, ValueType};
pub use sort_key::SortKey;
pub use ts::TxnTs;
