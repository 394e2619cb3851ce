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

//! Optimistic transaction context
//!
//! A transaction buffers its writes, records what it read, and resolves
//! everything at commit:
//!
//! 1. write all intents, stamped `mark_locked(read_ts)`, in sort order
//! 2. request a commit timestamp
//! 3. re-read the read set at the commit timestamp; any changed version
//!    aborts
//! 4. stamp every intent with the commit timestamp
//!
//! Locks are taken eagerly on writes under the centralized and
//! decentralized disciplines; the inlined discipline has no lock table and
//! detects clashes when intents are written. Lock release runs on every
//! exit path, including drop of an unresolved context.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use rilldb_core::ts::{mark_locked, ABORTED_TXN_TS};
use rilldb_core::{Result, RillError, Row, SortKey, TxnTs};

use crate::options::Options;
use crate::page::RowView;
use crate::subtable::{lock_key, subtable_of_lock_key, SubTable};
use crate::txn_manager::TxnManager;
use crate::wal_record::TxnLogRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnType {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockManagerKind {
    /// One global lock table on the transaction manager.
    Centralized,
    /// One lock table per subtable.
    Decentralized,
    /// No lock table; the intent timestamp itself is the lock.
    Inlined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Active,
    Committed,
    Aborted,
}

pub struct TxnContext {
    txn_id: u64,
    txn_type: TxnType,
    lock_kind: LockManagerKind,
    read_ts: TxnTs,
    commit_ts: TxnTs,
    // sorted so intents are written in deterministic order
    write_set: BTreeMap<(String, SortKey), Option<Row>>,
    read_set: HashMap<(String, SortKey), Option<TxnTs>>,
    lock_set: HashSet<Vec<u8>>,
    tables: HashMap<String, SubTable>,
    manager: Arc<TxnManager>,
    state: TxnState,
    intents_written: bool,
    last_lsn: u64,
}

impl TxnContext {
    pub(crate) fn new(
        manager: Arc<TxnManager>,
        txn_id: u64,
        txn_type: TxnType,
        lock_kind: LockManagerKind,
        read_ts: TxnTs,
        last_lsn: u64,
    ) -> Self {
        Self {
            txn_id,
            txn_type,
            lock_kind,
            read_ts,
            commit_ts: 0,
            write_set: BTreeMap::new(),
            read_set: HashMap::new(),
            lock_set: HashSet::new(),
            tables: HashMap::new(),
            manager,
            state: TxnState::Active,
            intents_written: false,
            last_lsn,
        }
    }

    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    pub fn read_ts(&self) -> TxnTs {
        self.read_ts
    }

    /// End LSN of the last log record this transaction appended.
    pub fn last_lsn(&self) -> u64 {
        self.last_lsn
    }

    /// Read `(subtable_key, sort_key)` at this transaction's read
    /// timestamp. Read-write transactions see their own buffered writes
    /// and record the observed version for commit-time validation.
    pub fn get_row(
        &mut self,
        subtable_key: &str,
        sort_key: &SortKey,
        opts: &Options,
    ) -> Result<RowView> {
        self.ensure_active()?;
        if self.txn_type == TxnType::ReadOnly {
            let read_ts = self.read_ts;
            return self.table(subtable_key, opts)?.get_row(sort_key, read_ts, opts);
        }

        let set_key = (subtable_key.to_string(), sort_key.clone());
        if let Some(buffered) = self.write_set.get(&set_key) {
            return match buffered {
                Some(row) => Ok(RowView {
                    row: row.clone(),
                    ts: self.read_ts,
                }),
                None => Err(RillError::NotFound),
            };
        }

        let read_ts = self.read_ts;
        let result = self.table(subtable_key, opts)?.get_row(sort_key, read_ts, opts);
        // only reads against the real table are validated at commit
        match &result {
            Ok(view) => {
                self.read_set.insert(set_key, Some(view.ts));
            }
            Err(e) if e.is_not_found() => {
                self.read_set.insert(set_key, None);
            }
            Err(_) => {}
        }
        result
    }

    /// Buffer a row write. Later writes to the same key overwrite earlier
    /// ones.
    pub fn set_row(&mut self, subtable_key: &str, row: Row, opts: &Options) -> Result<()> {
        self.ensure_writable()?;
        let sort_key = row.sort_key();
        self.acquire_lock(subtable_key, &sort_key, opts)?;
        self.write_set
            .insert((subtable_key.to_string(), sort_key), Some(row));
        Ok(())
    }

    /// Buffer a delete.
    pub fn delete_row(&mut self, subtable_key: &str, sort_key: &SortKey, opts: &Options) -> Result<()> {
        self.ensure_writable()?;
        self.acquire_lock(subtable_key, sort_key, opts)?;
        self.write_set
            .insert((subtable_key.to_string(), sort_key.clone()), None);
        Ok(())
    }

    /// Run the commit protocol. Returns the commit timestamp; a conflict or
    /// failed validation aborts with `TxnAborted` and leaves no visible
    /// trace of the transaction.
    pub fn commit(&mut self, opts: &Options) -> Result<TxnTs> {
        self.ensure_active()?;
        if self.txn_type == TxnType::ReadOnly {
            self.state = TxnState::Committed;
            return Ok(self.read_ts);
        }

        let result = self.commit_internal(opts);
        self.release_locks();
        match result {
            Ok(commit_ts) => {
                self.state = TxnState::Committed;
                self.manager.record_commit(commit_ts);
                debug!(
                    txn_id = self.txn_id,
                    read_ts = self.read_ts,
                    commit_ts,
                    "transaction committed"
                );
                Ok(commit_ts)
            }
            Err(e) => {
                self.state = TxnState::Aborted;
                self.append_log(TxnLogRecord::abort(self.read_ts));
                info!(
                    txn_id = self.txn_id,
                    read_ts = self.read_ts,
                    error = %e,
                    "failed to commit"
                );
                Err(e)
            }
        }
    }

    fn commit_internal(&mut self, opts: &Options) -> Result<TxnTs> {
        let mut intent_opts = opts.clone();
        intent_opts.check_intent_locked = self.lock_kind == LockManagerKind::Inlined;
        self.write_intents(&intent_opts)?;

        let commit_ts = self.manager.request_ts();
        self.commit_ts = commit_ts;

        if let Err(e) = self.validate_reads(opts) {
            self.stamp_intents(ABORTED_TXN_TS, opts);
            return Err(e);
        }

        // the commit record is the durability point; stamping makes the
        // writes visible only after it is in the log
        if let Some(store) = self.manager.log_store().cloned() {
            match store.append_records(&[TxnLogRecord::commit(self.read_ts, commit_ts).encode()]) {
                Ok(range) => self.last_lsn = self.last_lsn.max(range.end_lsn),
                Err(e) => {
                    self.stamp_intents(ABORTED_TXN_TS, opts);
                    return Err(RillError::TxnAborted(format!(
                        "commit log append failed: {e}"
                    )));
                }
            }
        }

        self.stamp_intents(commit_ts, opts);
        Ok(commit_ts)
    }

    /// Install every buffered write as a locked intent, in key order. On a
    /// clash (inlined discipline) the already-installed prefix is stamped
    /// aborted.
    fn write_intents(&mut self, opts: &Options) -> Result<()> {
        let locked_ts = mark_locked(self.read_ts);
        let entries: Vec<((String, SortKey), Option<Row>)> = self
            .write_set
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut undo: Vec<(String, SortKey)> = Vec::new();
        for ((subtable_key, sort_key), value) in entries {
            let outcome = {
                let table = self.table(&subtable_key, opts)?;
                match value {
                    Some(row) => table.set_row(row, locked_ts, opts),
                    None => table.delete_row(&sort_key, locked_ts, opts),
                }
            };
            if let Err(e) = outcome {
                for (undo_subtable, undo_key) in undo {
                    self.stamp_one(&undo_subtable, &undo_key, ABORTED_TXN_TS, opts);
                }
                return Err(RillError::TxnAborted(format!("intent write failed: {e}")));
            }
            undo.push((subtable_key, sort_key));
        }
        self.intents_written = true;
        Ok(())
    }

    /// Re-read everything in the read set at the commit timestamp. The
    /// transaction's own intents are transparent, so a key this
    /// transaction also wrote validates against the committed version
    /// beneath its intent.
    fn validate_reads(&mut self, opts: &Options) -> Result<()> {
        let mut read_opts = opts.clone();
        read_opts.owner_ts = Some(self.read_ts);
        let commit_ts = self.commit_ts;
        let entries: Vec<((String, SortKey), Option<TxnTs>)> = self
            .read_set
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for ((subtable_key, sort_key), expected) in entries {
            let observed = {
                let table = self.table(&subtable_key, &read_opts)?;
                table.get_row(&sort_key, commit_ts, &read_opts)
            };
            match (expected, observed) {
                (Some(ts), Ok(view)) if view.ts == ts => {}
                (None, Err(e)) if e.is_not_found() => {}
                (Some(ts), Ok(view)) => {
                    info!(
                        txn_id = self.txn_id,
                        expected = ts,
                        observed = view.ts,
                        "read validation: version changed"
                    );
                    return Err(RillError::TxnAborted("read validation failed".into()));
                }
                (Some(_), Err(e)) => {
                    return Err(RillError::TxnAborted(format!(
                        "read validation failed: {e}"
                    )));
                }
                (None, Ok(view)) => {
                    info!(
                        txn_id = self.txn_id,
                        observed = view.ts,
                        "read validation: row appeared"
                    );
                    return Err(RillError::TxnAborted("read validation failed".into()));
                }
                (None, Err(e)) => {
                    return Err(RillError::TxnAborted(format!(
                        "read validation failed: {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn stamp_intents(&mut self, ts: TxnTs, opts: &Options) {
        let keys: Vec<(String, SortKey)> = self.write_set.keys().cloned().collect();
        for (subtable_key, sort_key) in keys {
            self.stamp_one(&subtable_key, &sort_key, ts, opts);
        }
    }

    fn stamp_one(&mut self, subtable_key: &str, sort_key: &SortKey, ts: TxnTs, opts: &Options) {
        let result = match self.table(subtable_key, opts) {
            Ok(table) => table.set_ts(sort_key, ts, opts),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(
                txn_id = self.txn_id,
                subtable_key,
                error = %e,
                "failed to stamp intent"
            );
        }
    }

    /// Abort the transaction, releasing locks. A no-op when already
    /// resolved.
    pub fn abort(&mut self, opts: &Options) {
        if self.state != TxnState::Active {
            return;
        }
        if self.intents_written {
            self.stamp_intents(ABORTED_TXN_TS, opts);
        }
        self.release_locks();
        self.state = TxnState::Aborted;
        self.append_log(TxnLogRecord::abort(self.read_ts));
        debug!(txn_id = self.txn_id, read_ts = self.read_ts, "transaction aborted");
    }

    fn acquire_lock(&mut self, subtable_key: &str, sort_key: &SortKey, opts: &Options) -> Result<()> {
        if self.lock_kind == LockManagerKind::Inlined {
            return Ok(());
        }
        let key = lock_key(subtable_key, sort_key);
        if self.lock_set.contains(&key) {
            return Ok(());
        }
        match self.lock_kind {
            LockManagerKind::Centralized => {
                self.manager.lock_table().lock(&key, self.read_ts)?;
            }
            LockManagerKind::Decentralized => {
                let read_ts = self.read_ts;
                self.table(subtable_key, opts)?
                    .lock_table()
                    .lock(&key, read_ts)?;
            }
            LockManagerKind::Inlined => unreachable!(),
        }
        self.lock_set.insert(key);
        Ok(())
    }

    fn release_locks(&mut self) {
        let keys: Vec<Vec<u8>> = self.lock_set.drain().collect();
        for key in keys {
            match self.lock_kind {
                LockManagerKind::Centralized => {
                    self.manager.lock_table().unlock(&key, self.read_ts);
                }
                LockManagerKind::Decentralized => {
                    // every locked key went through set_row/delete_row, so
                    // its subtable is already open
                    if let Some(table) =
                        subtable_of_lock_key(&key).and_then(|name| self.tables.get(name))
                    {
                        table.lock_table().unlock(&key, self.read_ts);
                    }
                }
                LockManagerKind::Inlined => {}
            }
        }
    }

    fn append_log(&mut self, record: TxnLogRecord) {
        if let Some(store) = self.manager.log_store() {
            match store.append_records(&[record.encode()]) {
                Ok(range) => self.last_lsn = self.last_lsn.max(range.end_lsn),
                Err(e) => warn!(txn_id = self.txn_id, error = %e, "failed to append log record"),
            }
        }
    }

    fn table(&mut self, subtable_key: &str, opts: &Options) -> Result<&SubTable> {
        match self.tables.entry(subtable_key.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let table = SubTable::open(subtable_key, opts)?;
                Ok(entry.insert(table))
            }
        }
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Committed => Err(RillError::InvalidArgument(
                "transaction already committed".into(),
            )),
            TxnState::Aborted => Err(RillError::TxnAborted("transaction already aborted".into())),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_active()?;
        if self.txn_type == TxnType::ReadOnly {
            return Err(RillError::InvalidArgument(
                "write on a read-only transaction".into(),
            ));
        }
        Ok(())
    }
}

impl Drop for TxnContext {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            self.release_locks();
        }
    }
}

impl std::fmt::Debug for TxnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnContext")
            .field("txn_id", &self.txn_id)
            .field("txn_type", &self.txn_type)
            .field("read_ts", &self.read_ts)
            .field("writes", &self.write_set.len())
            .field("reads", &self.read_set.len())
            .field("state", &self.state)
            .finish()
    }
}
