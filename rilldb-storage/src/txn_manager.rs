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

//! Transaction manager: timestamp oracle and commit bookkeeping.
//!
//! Issues strictly increasing timestamps (a transaction's read timestamp
//! at begin, its commit timestamp during commit), owns the centralized
//! lock table, and carries the optional log store that makes transaction
//! boundaries durable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use rilldb_core::ts::INVALID_TS;
use rilldb_core::TxnTs;

use crate::lock_table::{LockTable, LockTableConfig};
use crate::log_store::LogStore;
use crate::txn_context::{LockManagerKind, TxnContext, TxnType};
use crate::wal_record::TxnLogRecord;

pub struct TxnManager {
    next_ts: AtomicU64,
    next_txn_id: AtomicU64,
    max_committed_ts: AtomicU64,
    lock_table: Arc<LockTable>,
    log_store: Option<Arc<LogStore>>,
}

impl TxnManager {
    pub fn new() -> Self {
        Self::with_lock_config(LockTableConfig::default())
    }

    pub fn with_lock_config(config: LockTableConfig) -> Self {
        Self {
            next_ts: AtomicU64::new(INVALID_TS + 1),
            next_txn_id: AtomicU64::new(1),
            max_committed_ts: AtomicU64::new(INVALID_TS),
            lock_table: Arc::new(LockTable::new(config)),
            log_store: None,
        }
    }

    /// Attach a log store; transaction boundaries will be appended to it.
    pub fn with_log_store(mut self, log_store: Arc<LogStore>) -> Self {
        self.log_store = Some(log_store);
        self
    }

    /// Next timestamp; strictly increasing across all callers.
    pub fn request_ts(&self) -> TxnTs {
        self.next_ts.fetch_add(1, Ordering::SeqCst)
    }

    /// Start a transaction. Its read timestamp orders it after every commit
    /// that already requested one.
    pub fn begin(self: &Arc<Self>, txn_type: TxnType, lock_kind: LockManagerKind) -> TxnContext {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let read_ts = self.request_ts();
        let mut last_lsn = 0;
        if let Some(store) = &self.log_store {
            match store.append_records(&[TxnLogRecord::begin(read_ts).encode()]) {
                Ok(range) => last_lsn = range.end_lsn,
                Err(e) => warn!(txn_id, error = %e, "failed to log transaction begin"),
            }
        }
        TxnContext::new(Arc::clone(self), txn_id, txn_type, lock_kind, read_ts, last_lsn)
    }

    /// Record a commit decision.
    pub(crate) fn record_commit(&self, commit_ts: TxnTs) {
        self.max_committed_ts.fetch_max(commit_ts, Ordering::SeqCst);
    }

    /// Largest commit timestamp recorded so far.
    pub fn max_committed_ts(&self) -> TxnTs {
        self.max_committed_ts.load(Ordering::SeqCst)
    }

    pub(crate) fn lock_table(&self) -> &LockTable {
        &self.lock_table
    }

    pub(crate) fn log_store(&self) -> Option<&Arc<LogStore>> {
        self.log_store.as_ref()
    }
}

impl Default for TxnManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TxnManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnManager")
            .field("next_ts", &self.next_ts.load(Ordering::Relaxed))
            .field("max_committed_ts", &self.max_committed_ts())
            .field("logged", &self.log_store.is_some())
            .finish()
    }
}
