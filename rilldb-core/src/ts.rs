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

//! Transaction timestamps
//!
//! A `TxnTs` is a 64-bit logical timestamp; larger means newer. Bit 63 is
//! the intent-lock flag: a version written by an in-flight transaction
//! carries `mark_locked(read_ts)` until commit or abort stamps it with the
//! final timestamp. `ABORTED_TXN_TS` marks a version as dead; readers skip
//! it unconditionally.

/// Logical transaction timestamp.
pub type TxnTs = u64;

/// Never issued to a transaction; "no timestamp".
pub const INVALID_TS: TxnTs = 0;

/// Stamped on intents of aborted transactions.
pub const ABORTED_TXN_TS: TxnTs = u64::MAX;

/// Intent-lock flag bit.
pub const LOCKED_BIT: TxnTs = 1 << 63;

/// Tag `ts` as an in-flight intent owned by the transaction that read at `ts`.
#[inline]
pub fn mark_locked(ts: TxnTs) -> TxnTs {
    debug_assert!(!is_locked(ts) && !is_aborted(ts));
    ts | LOCKED_BIT
}

/// True when `ts` carries a live intent lock. `ABORTED_TXN_TS` has the flag
/// bit set but is a dead marker, not a lock.
#[inline]
pub fn is_locked(ts: TxnTs) -> bool {
    ts != ABORTED_TXN_TS && (ts & LOCKED_BIT) != 0
}

/// The read timestamp of the transaction owning a locked intent.
#[inline]
pub fn locked_owner(ts: TxnTs) -> TxnTs {
    ts & !LOCKED_BIT
}

#[inline]
pub fn is_aborted(ts: TxnTs) -> bool {
    ts == ABORTED_TXN_TS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_round_trip() {
        let ts = 42;
        let locked = mark_locked(ts);
        assert!(is_locked(locked));
        assert!(!is_locked(ts));
        assert_eq!(locked_owner(locked), ts);
    }

    #[test]
    fn test_aborted_is_not_locked() {
        assert!(is_aborted(ABORTED_TXN_TS));
        assert!(!is_locked(ABORTED_TXN_TS));
    }

    #[test]
    fn test_invalid_ts_is_plain() {
        assert!(!is_locked(INVALID_TS));
        assert!(!is_aborted(INVALID_TS));
    }
}
