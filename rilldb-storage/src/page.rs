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

//! Versioned delta-chain page
//!
//! A page holds multi-version rows keyed by sort key. Mutations prepend
//! delta nodes to a chain whose head is an atomically swappable pointer;
//! readers load the head and walk newest-to-oldest without locks, writers
//! install with a CAS loop, and a background fold collapses long chains
//! into a consolidated base at the tail.
//!
//! ```text
//! head ──► [put k2@9] ──► [delete k1@7] ──► [put k1@5] ──► [base]
//! ```
//!
//! ## Visibility
//!
//! A read at `read_ts` resolves a sort key to the newest entry with
//! `ts <= read_ts` that is neither aborted nor a live intent. Intents are
//! versions stamped `mark_locked(read_ts)` by an in-flight transaction;
//! they are invisible to plain readers, transparent to their owner (the
//! owner's reads continue to the committed version beneath), and fail a
//! validation read (`owner_ts` set) when held by anyone else.
//!
//! ## Compaction
//!
//! One compactor per page runs at a time. It captures the head, folds the
//! chain into per-key version lists (dropping aborted entries, keeping
//! every committed version so older snapshots still resolve, carrying live
//! intents), then publishes: a head CAS when nothing was installed
//! meanwhile, otherwise a splice under the freshly installed prefix.
//! Timestamp cells are shared between chain nodes and folded versions, so
//! stamping an intent lands regardless of where its entry currently lives.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use smallvec::SmallVec;
use tracing::debug;

use rilldb_core::ts::{is_aborted, is_locked, locked_owner, INVALID_TS};
use rilldb_core::{Result, RillError, Row, SortKey, TxnTs};

use crate::options::Options;

pub const DEFAULT_DELTA_CHAIN_LENGTH: usize = 16;

#[derive(Debug, Clone)]
pub struct PageConfig {
    /// Chain length beyond which installs trigger compaction.
    pub delta_chain_length: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            delta_chain_length: DEFAULT_DELTA_CHAIN_LENGTH,
        }
    }
}

impl PageConfig {
    pub fn with_delta_chain_length(mut self, length: usize) -> Self {
        self.delta_chain_length = length.max(1);
        self
    }
}

/// A row resolved by a page read, tagged with the timestamp of the version
/// that produced it.
#[derive(Debug, Clone)]
pub struct RowView {
    pub row: Row,
    pub ts: TxnTs,
}

/// The operations a page implementation provides.
pub trait PageOps {
    /// Install a new version of `row` at `ts`. Unconditional from the
    /// page's perspective; conflict checking belongs to the transaction
    /// layer (or to `check_intent_locked` under the inlined discipline).
    fn set_row(&self, row: Row, ts: TxnTs, opts: &Options) -> Result<()>;

    /// Install a tombstone for `sort_key` at `ts`.
    fn delete_row(&self, sort_key: &SortKey, ts: TxnTs, opts: &Options) -> Result<()>;

    /// Resolve `sort_key` at `read_ts`.
    fn get_row(&self, sort_key: &SortKey, read_ts: TxnTs, opts: &Options) -> Result<RowView>;

    /// Rewrite the live intent on `sort_key` to `new_ts`; commit and abort
    /// stamping. Idempotent when the newest entry already carries `new_ts`.
    fn set_ts(&self, sort_key: &SortKey, new_ts: TxnTs, opts: &Options) -> Result<()>;
}

enum DeltaOp {
    Put(Row),
    Delete(SortKey),
    Base(BaseMap),
}

type BaseMap = BTreeMap<SortKey, SmallVec<[BaseVersion; 2]>>;

/// One folded version; newest first within a key's list. A `None` row is a
/// tombstone. The timestamp cell is shared with the chain node it was
/// folded from.
struct BaseVersion {
    ts: Arc<AtomicU64>,
    row: Option<Row>,
}

struct DeltaNode {
    op: DeltaOp,
    ts: Arc<AtomicU64>,
    /// Immutable once the node is published, except that the compactor may
    /// swing the boundary node's next to a freshly folded base.
    next: ArcSwapOption<DeltaNode>,
}

enum Visibility {
    Visible(TxnTs),
    Skip,
    /// A live intent held by another transaction, hit by a validation read.
    Blocked(TxnTs),
}

fn check_visibility(raw: TxnTs, read_ts: TxnTs, opts: &Options) -> Visibility {
    if is_aborted(raw) {
        return Visibility::Skip;
    }
    if is_locked(raw) {
        if opts.ignore_lock {
            return Visibility::Visible(raw);
        }
        return match opts.owner_ts {
            // the owner sees through its own intent to the version beneath
            Some(owner) if owner == locked_owner(raw) => Visibility::Skip,
            Some(_) => Visibility::Blocked(locked_owner(raw)),
            None => Visibility::Skip,
        };
    }
    if raw <= read_ts {
        Visibility::Visible(raw)
    } else {
        Visibility::Skip
    }
}

fn same_node(a: &Option<Arc<DeltaNode>>, b: &Option<Arc<DeltaNode>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

pub struct VersionedPage {
    head: ArcSwapOption<DeltaNode>,
    compacting: AtomicBool,
    config: PageConfig,
}

impl Default for VersionedPage {
    fn default() -> Self {
        Self::new(PageConfig::default())
    }
}

impl std::fmt::Debug for VersionedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedPage")
            .field("delta_chain_len", &self.delta_chain_len())
            .finish()
    }
}

impl VersionedPage {
    pub fn new(config: PageConfig) -> Self {
        Self {
            head: ArcSwapOption::empty(),
            compacting: AtomicBool::new(false),
            config,
        }
    }

    /// Observable chain length; a base counts as one link.
    pub fn delta_chain_len(&self) -> usize {
        let mut len = 0;
        let mut cursor = self.head.load_full();
        while let Some(node) = cursor {
            len += 1;
            cursor = node.next.load_full();
        }
        len
    }

    fn install(&self, op: DeltaOp, ts: TxnTs, opts: &Options) -> Result<()> {
        let key = match &op {
            DeltaOp::Put(row) => row.sort_key(),
            DeltaOp::Delete(key) => key.clone(),
            DeltaOp::Base(_) => {
                return Err(RillError::Internal("cannot install a base directly".into()))
            }
        };
        let node = Arc::new(DeltaNode {
            op,
            ts: Arc::new(AtomicU64::new(ts)),
            next: ArcSwapOption::empty(),
        });
        let mut conflict = None;
        self.head.rcu(|current| {
            conflict = None;
            if opts.check_intent_locked {
                if let Some(owner) = find_live_intent(current, &key) {
                    let mine = is_locked(ts) && locked_owner(ts) == owner;
                    if !mine {
                        conflict = Some(owner);
                        return current.clone();
                    }
                }
            }
            node.next.store(current.clone());
            Some(Arc::clone(&node))
        });
        if let Some(owner) = conflict {
            return Err(RillError::Conflict(format!(
                "live intent held by transaction reading at {owner}"
            )));
        }
        self.maybe_compact(opts);
        Ok(())
    }

    fn maybe_compact(&self, opts: &Options) {
        if opts.disable_compaction {
            return;
        }
        // Loop until the chain is back under the bound: installs racing past
        // an in-flight fold would otherwise leave the chain long with no
        // trigger left to shorten it.
        while self.delta_chain_len() > self.config.delta_chain_length {
            if self
                .compacting
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.compact();
                self.compacting.store(false, Ordering::Release);
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Fold the captured chain into a base and publish it. Holds the
    /// compacting flag: at most one fold per page at a time.
    fn compact(&self) {
        let Some(captured) = self.head.load_full() else {
            return;
        };

        let mut base = BaseMap::new();
        let mut cursor = Some(Arc::clone(&captured));
        while let Some(node) = cursor {
            match &node.op {
                DeltaOp::Put(row) => {
                    push_version(&mut base, row.sort_key(), &node.ts, Some(row.clone()))
                }
                DeltaOp::Delete(key) => push_version(&mut base, key.clone(), &node.ts, None),
                DeltaOp::Base(map) => {
                    for (key, versions) in map {
                        for version in versions {
                            push_version(&mut base, key.clone(), &version.ts, version.row.clone());
                        }
                    }
                }
            }
            cursor = node.next.load_full();
        }

        let keys = base.len();
        let base_node = Arc::new(DeltaNode {
            op: DeltaOp::Base(base),
            ts: Arc::new(AtomicU64::new(INVALID_TS)),
            next: ArcSwapOption::empty(),
        });

        // Publish. Head unchanged: swap it. Otherwise splice the base under
        // the deltas installed while folding; only the compactor mutates
        // the next pointer of a published node, so the splice cannot race.
        let mut swapped = false;
        self.head.rcu(|current| {
            if same_node(current, &Some(Arc::clone(&captured))) {
                swapped = true;
                Some(Arc::clone(&base_node))
            } else {
                swapped = false;
                current.clone()
            }
        });
        if !swapped {
            let mut cursor = self.head.load_full();
            loop {
                let Some(node) = cursor else {
                    debug_assert!(false, "captured head unreachable while publishing");
                    return;
                };
                let next = node.next.load_full();
                if same_node(&next, &Some(Arc::clone(&captured))) {
                    node.next.store(Some(base_node));
                    break;
                }
                cursor = next;
            }
        }
        debug!(keys, spliced = !swapped, "delta chain folded into base");
    }
}

impl PageOps for VersionedPage {
    fn set_row(&self, row: Row, ts: TxnTs, opts: &Options) -> Result<()> {
        self.install(DeltaOp::Put(row), ts, opts)
    }

    fn delete_row(&self, sort_key: &SortKey, ts: TxnTs, opts: &Options) -> Result<()> {
        self.install(DeltaOp::Delete(sort_key.clone()), ts, opts)
    }

    fn get_row(&self, sort_key: &SortKey, read_ts: TxnTs, opts: &Options) -> Result<RowView> {
        let mut cursor = self.head.load_full();
        while let Some(node) = cursor {
            match &node.op {
                DeltaOp::Put(row) if row.sort_key() == *sort_key => {
                    match check_visibility(node.ts.load(Ordering::SeqCst), read_ts, opts) {
                        Visibility::Visible(ts) => {
                            return Ok(RowView {
                                row: row.clone(),
                                ts,
                            })
                        }
                        Visibility::Blocked(owner) => return Err(blocked(owner)),
                        Visibility::Skip => {}
                    }
                }
                DeltaOp::Delete(key) if key == sort_key => {
                    match check_visibility(node.ts.load(Ordering::SeqCst), read_ts, opts) {
                        Visibility::Visible(_) => return Err(RillError::NotFound),
                        Visibility::Blocked(owner) => return Err(blocked(owner)),
                        Visibility::Skip => {}
                    }
                }
                DeltaOp::Base(map) => {
                    if let Some(versions) = map.get(sort_key) {
                        for version in versions {
                            match check_visibility(
                                version.ts.load(Ordering::SeqCst),
                                read_ts,
                                opts,
                            ) {
                                Visibility::Visible(ts) => {
                                    return match &version.row {
                                        Some(row) => Ok(RowView {
                                            row: row.clone(),
                                            ts,
                                        }),
                                        None => Err(RillError::NotFound),
                                    }
                                }
                                Visibility::Blocked(owner) => return Err(blocked(owner)),
                                Visibility::Skip => {}
                            }
                        }
                    }
                    // the base is always the tail
                    return Err(RillError::NotFound);
                }
                _ => {}
            }
            cursor = node.next.load_full();
        }
        Err(RillError::NotFound)
    }

    fn set_ts(&self, sort_key: &SortKey, new_ts: TxnTs, _opts: &Options) -> Result<()> {
        let mut cursor = self.head.load_full();
        while let Some(node) = cursor {
            match &node.op {
                DeltaOp::Put(row) if row.sort_key() == *sort_key => {
                    return stamp(&node.ts, new_ts);
                }
                DeltaOp::Delete(key) if key == sort_key => {
                    return stamp(&node.ts, new_ts);
                }
                DeltaOp::Base(map) => {
                    if let Some(first) = map.get(sort_key).and_then(|v| v.first()) {
                        return stamp(&first.ts, new_ts);
                    }
                    break;
                }
                _ => {}
            }
            cursor = node.next.load_full();
        }
        Err(RillError::Internal(
            "no entry to stamp for sort key".into(),
        ))
    }
}

fn blocked(owner: TxnTs) -> RillError {
    RillError::Conflict(format!(
        "live intent held by transaction reading at {owner}"
    ))
}

/// Stamp the newest entry's timestamp cell. Only a live intent may change
/// value; re-stamping the same timestamp is a no-op.
fn stamp(cell: &AtomicU64, new_ts: TxnTs) -> Result<()> {
    let raw = cell.load(Ordering::SeqCst);
    if is_locked(raw) {
        cell.store(new_ts, Ordering::SeqCst);
        Ok(())
    } else if raw == new_ts {
        Ok(())
    } else {
        Err(RillError::Internal(format!(
            "expected a live intent, found version at {raw}"
        )))
    }
}

fn find_live_intent(head: &Option<Arc<DeltaNode>>, key: &SortKey) -> Option<TxnTs> {
    let mut cursor = head.clone();
    while let Some(node) = cursor {
        match &node.op {
            DeltaOp::Put(row) if row.sort_key() == *key => {
                return live_owner(node.ts.load(Ordering::SeqCst));
            }
            DeltaOp::Delete(k) if k == key => {
                return live_owner(node.ts.load(Ordering::SeqCst));
            }
            DeltaOp::Base(map) => {
                return map
                    .get(key)
                    .and_then(|versions| versions.first())
                    .and_then(|v| live_owner(v.ts.load(Ordering::SeqCst)));
            }
            _ => {}
        }
        cursor = node.next.load_full();
    }
    None
}

fn live_owner(raw: TxnTs) -> Option<TxnTs> {
    if is_locked(raw) {
        Some(locked_owner(raw))
    } else {
        None
    }
}

/// Append a folded version to `key`'s list. Entries arrive newest-install
/// first; an equal timestamp means the earlier arrival (the later install)
/// already won.
fn push_version(base: &mut BaseMap, key: SortKey, cell: &Arc<AtomicU64>, row: Option<Row>) {
    let raw = cell.load(Ordering::SeqCst);
    if is_aborted(raw) {
        return;
    }
    let versions = base.entry(key).or_default();
    if let Some(prev) = versions.last() {
        if prev.ts.load(Ordering::SeqCst) == raw {
            return;
        }
    }
    versions.push(BaseVersion {
        ts: Arc::clone(cell),
        row,
    });
}
