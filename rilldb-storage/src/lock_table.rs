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

//! Sharded exclusive lock table
//!
//! Locks are keyed by `subtable_key ++ '#' ++ sort_key_bytes` and owned by a
//! transaction's read timestamp. Acquisition is reentrant for the same
//! owner and blocks with a deadline when contended; a timed-out acquisition
//! aborts the transaction. One table serves as the centralized manager,
//! and each page slot owns one for the decentralized discipline.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use rilldb_core::{Result, RillError, TxnTs};

pub const DEFAULT_SHARD_COUNT: usize = 64;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct LockTableConfig {
    pub shard_count: usize,
    pub lock_timeout: Duration,
}

impl Default for LockTableConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl LockTableConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_shard_count(mut self, shards: usize) -> Self {
        self.shard_count = shards.max(1);
        self
    }
}

struct Shard {
    // lock key -> owning read timestamp
    entries: Mutex<HashMap<Vec<u8>, TxnTs>>,
    released: Condvar,
}

pub struct LockTable {
    shards: Box<[Shard]>,
    timeout: Duration,
}

impl LockTable {
    pub fn new(config: LockTableConfig) -> Self {
        let shards = (0..config.shard_count.max(1))
            .map(|_| Shard {
                entries: Mutex::new(HashMap::new()),
                released: Condvar::new(),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            timeout: config.lock_timeout,
        }
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Acquire the exclusive lock on `key` for `owner_ts`, waiting up to the
    /// configured timeout. Reentrant for the same owner.
    pub fn lock(&self, key: &[u8], owner_ts: TxnTs) -> Result<()> {
        let shard = self.shard(key);
        let deadline = Instant::now() + self.timeout;
        let mut entries = shard.entries.lock();
        loop {
            match entries.get(key) {
                None => {
                    entries.insert(key.to_vec(), owner_ts);
                    return Ok(());
                }
                Some(&holder) if holder == owner_ts => return Ok(()),
                Some(_) => {
                    if shard
                        .released
                        .wait_until(&mut entries, deadline)
                        .timed_out()
                    {
                        return Err(RillError::LockTimeout(self.timeout));
                    }
                }
            }
        }
    }

    /// Release `key` if held by `owner_ts`. Returns whether a lock was
    /// released; releasing a lock that is not held is a no-op.
    pub fn unlock(&self, key: &[u8], owner_ts: TxnTs) -> bool {
        let shard = self.shard(key);
        let mut entries = shard.entries.lock();
        match entries.get(key) {
            Some(&holder) if holder == owner_ts => {
                entries.remove(key);
                shard.released.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Current holder of `key`, if any.
    pub fn holder(&self, key: &[u8]) -> Option<TxnTs> {
        self.shard(key).entries.lock().get(key).copied()
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("shards", &self.shards.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_is_reentrant_for_owner() {
        let table = LockTable::new(LockTableConfig::default());
        table.lock(b"a#1", 10).unwrap();
        table.lock(b"a#1", 10).unwrap();
        assert_eq!(table.holder(b"a#1"), Some(10));
        assert!(table.unlock(b"a#1", 10));
        assert_eq!(table.holder(b"a#1"), None);
    }

    #[test]
    fn test_contended_lock_times_out() {
        let table = LockTable::new(
            LockTableConfig::default().with_lock_timeout(Duration::from_millis(20)),
        );
        table.lock(b"a#1", 1).unwrap();
        let err = table.lock(b"a#1", 2).unwrap_err();
        assert!(matches!(err, RillError::LockTimeout(_)));
        // holder unchanged
        assert_eq!(table.holder(b"a#1"), Some(1));
    }

    #[test]
    fn test_unlock_wrong_owner_is_noop() {
        let table = LockTable::new(LockTableConfig::default());
        table.lock(b"a#1", 1).unwrap();
        assert!(!table.unlock(b"a#1", 2));
        assert_eq!(table.holder(b"a#1"), Some(1));
    }

    #[test]
    fn test_waiter_acquires_after_release() {
        let table = Arc::new(LockTable::new(
            LockTableConfig::default().with_lock_timeout(Duration::from_secs(5)),
        ));
        table.lock(b"a#1", 1).unwrap();
        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.lock(b"a#1", 2))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(table.unlock(b"a#1", 1));
        waiter.join().unwrap().unwrap();
        assert_eq!(table.holder(b"a#1"), Some(2));
    }

    #[test]
    fn test_disjoint_keys_do_not_contend() {
        let table = LockTable::new(LockTableConfig::default());
        table.lock(b"a#1", 1).unwrap();
        table.lock(b"a#2", 2).unwrap();
        table.lock(b"b#1", 3).unwrap();
        assert_eq!(table.holder(b"a#2"), Some(2));
    }
}
