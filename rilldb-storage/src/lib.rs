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

//! RillDB Storage Engine
//!
//! An embedded MVCC storage engine for small rows under composite sort
//! keys:
//!
//! - **Versioned pages**: delta chains with lock-free reads, CAS installs,
//!   and background consolidation
//! - **Optimistic transactions**: buffered writes, commit-time read
//!   validation, three lock disciplines
//! - **Write-ahead log**: a ring of segments coordinated by a packed
//!   atomic control word, flushed and recycled by a background worker
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rilldb_storage::{BufferPool, LockManagerKind, Options, TxnManager, TxnType};
//!
//! let pool = Arc::new(BufferPool::new());
//! let manager = Arc::new(TxnManager::new());
//! let opts = Options::new().with_buffer_pool(pool);
//!
//! let mut txn = manager.begin(TxnType::ReadWrite, LockManagerKind::Centralized);
//! txn.set_row("points", row, &opts)?;
//! let commit_ts = txn.commit(&opts)?;
//! ```

pub mod buffer_pool;
pub mod lock_table;
mod log_segment;
pub mod log_store;
pub mod options;
pub mod page;
pub mod subtable;
pub mod txn_context;
pub mod txn_manager;
pub mod wal_record;

pub use buffer_pool::{BufferPool, PageSlot};
pub use lock_table::{LockTable, LockTableConfig};
pub use log_store::{LogStore, LogStoreConfig, LsnRange};
pub use options::Options;
pub use page::{PageConfig, PageOps, RowView, VersionedPage};
pub use subtable::SubTable;
pub use txn_context::{LockManagerKind, TxnContext, TxnType};
pub use txn_manager::TxnManager;
pub use wal_record::{TxnLogRecord, WalRecordKind};
