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

//! Per-call options for page and transaction operations.

use std::sync::Arc;

use rilldb_core::{Schema, TxnTs};

use crate::buffer_pool::BufferPool;

/// Options threaded through reads and writes. The buffer pool is passed
/// here explicitly; there are no process-wide singletons.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub schema: Option<Arc<Schema>>,
    pub buffer_pool: Option<Arc<BufferPool>>,
    /// Suppress delta-chain compaction triggers.
    pub disable_compaction: bool,
    /// Reads return locked intents with their raw timestamps.
    pub ignore_lock: bool,
    /// Set during read validation: intents owned by this read timestamp are
    /// seen through, any other live intent fails the read.
    pub owner_ts: Option<TxnTs>,
    /// Writes detect a live intent held by another transaction (inlined
    /// lock discipline).
    pub check_intent_locked: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.buffer_pool = Some(pool);
        self
    }

    pub fn with_disable_compaction(mut self, disable: bool) -> Self {
        self.disable_compaction = disable;
        self
    }
}
