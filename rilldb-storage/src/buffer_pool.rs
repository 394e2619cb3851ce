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

//! Buffer pool: subtable key -> page slot.
//!
//! Each slot pairs a versioned page with its per-subtable lock table
//! (used by the decentralized lock discipline). Slots are created on
//! first open and shared by every transaction touching the subtable.

use std::sync::Arc;

use dashmap::DashMap;

use crate::lock_table::{LockTable, LockTableConfig};
use crate::page::{PageConfig, VersionedPage};

#[derive(Debug)]
pub struct PageSlot {
    pub page: VersionedPage,
    pub locks: LockTable,
}

pub struct BufferPool {
    slots: DashMap<String, Arc<PageSlot>>,
    page_config: PageConfig,
    lock_config: LockTableConfig,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_configs(PageConfig::default(), LockTableConfig::default())
    }

    pub fn with_configs(page_config: PageConfig, lock_config: LockTableConfig) -> Self {
        Self {
            slots: DashMap::new(),
            page_config,
            lock_config,
        }
    }

    /// Slot for `subtable_key`, created on first use.
    pub fn slot(&self, subtable_key: &str) -> Arc<PageSlot> {
        if let Some(slot) = self.slots.get(subtable_key) {
            return Arc::clone(slot.value());
        }
        self.slots
            .entry(subtable_key.to_string())
            .or_insert_with(|| {
                Arc::new(PageSlot {
                    page: VersionedPage::new(self.page_config.clone()),
                    locks: LockTable::new(self.lock_config.clone()),
                })
            })
            .clone()
    }

    pub fn page_count(&self) -> usize {
        self.slots.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("pages", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_shared() {
        let pool = BufferPool::new();
        let a = pool.slot("graph");
        let b = pool.slot("graph");
        assert!(Arc::ptr_eq(&a, &b));
        let c = pool.slot("other");
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(pool.page_count(), 2);
    }
}
