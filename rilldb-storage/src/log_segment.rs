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

//! Log segment with a CAS-packed control word
//!
//! One 64-bit atomic word coordinates all writers of a segment:
//!
//! ```text
//! | IsSealed 1 bit | WriterCount 15 bits | NextLsnOffset 48 bits |
//! ```
//!
//! A writer claims `[offset, offset + len)` of the segment buffer by
//! CAS-bumping the offset and writer count in one step; the returned guard
//! releases the writer slot on drop. Sealing sets the top bit, after which
//! the offset never changes. The last writer to leave a sealed segment
//! moves it from `Open` to `Io`, handing it to the flusher.
//!
//! Segment lifecycle: `Free -> Open -> Io -> Free`. The sealed condition
//! lives in the control word, not in the state.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

const SEALED_BIT: u64 = 1 << 63;
const WRITER_COUNT_SHIFT: u32 = 48;
const WRITER_COUNT_MASK: u64 = 0x7fff;
const OFFSET_MASK: u64 = (1 << 48) - 1;

pub(crate) const MAX_WRITER_COUNT: u64 = WRITER_COUNT_MASK;

#[inline]
fn is_sealed(word: u64) -> bool {
    word & SEALED_BIT != 0
}

#[inline]
fn writer_count(word: u64) -> u64 {
    (word >> WRITER_COUNT_SHIFT) & WRITER_COUNT_MASK
}

#[inline]
fn next_offset(word: u64) -> u64 {
    word & OFFSET_MASK
}

#[inline]
fn with_sealed(word: u64) -> u64 {
    word | SEALED_BIT
}

#[inline]
fn incr_writer(word: u64) -> u64 {
    word + (1 << WRITER_COUNT_SHIFT)
}

#[inline]
fn decr_writer(word: u64) -> u64 {
    word - (1 << WRITER_COUNT_SHIFT)
}

#[inline]
fn bump_offset(word: u64, len: u64) -> u64 {
    word + len
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentState {
    Free = 0,
    Open = 1,
    Io = 2,
}

impl SegmentState {
    fn from_u8(raw: u8) -> SegmentState {
        match raw {
            0 => SegmentState::Free,
            1 => SegmentState::Open,
            _ => SegmentState::Io,
        }
    }
}

pub(crate) enum AcquireOutcome<'a> {
    /// The caller owns `[offset, offset + len)` until the guard drops.
    Acquired { offset: u64, guard: WriterGuard<'a> },
    /// The segment cannot fit the batch; seal it and move on.
    MustSeal,
    /// The writer count is saturated; back off and retry.
    MustWait,
}

pub(crate) struct LogSegment {
    state: AtomicU8,
    /// `| IsSealed:1 | WriterCount:15 | NextLsnOffset:48 |`
    control: AtomicU64,
    start_lsn: AtomicU64,
    size: usize,
    buf: UnsafeCell<Box<[u8]>>,
    signal_lock: Mutex<()>,
    signal: Condvar,
}

// Writers touch disjoint buffer ranges handed out by the control word; the
// flusher reads the buffer only in the Io state, when the segment is sealed
// and the writer count has drained to zero.
unsafe impl Sync for LogSegment {}

impl LogSegment {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            state: AtomicU8::new(SegmentState::Free as u8),
            control: AtomicU64::new(0),
            start_lsn: AtomicU64::new(0),
            size,
            buf: UnsafeCell::new(vec![0u8; size].into_boxed_slice()),
            signal_lock: Mutex::new(()),
            signal: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> SegmentState {
        SegmentState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn start_lsn(&self) -> u64 {
        self.start_lsn.load(Ordering::Acquire)
    }

    /// Offset the next writer would claim; after sealing, the final size of
    /// the segment's payload.
    pub(crate) fn pending_offset(&self) -> u64 {
        next_offset(self.control.load(Ordering::Acquire))
    }

    /// Claim `len` bytes. Loops internally on CAS contention; never blocks.
    pub(crate) fn try_acquire(&self, len: u64) -> AcquireOutcome<'_> {
        let mut current = self.control.load(Ordering::Acquire);
        loop {
            if is_sealed(current) {
                return AcquireOutcome::MustSeal;
            }
            if next_offset(current) + len > self.size as u64 {
                return AcquireOutcome::MustSeal;
            }
            if writer_count(current) + 1 > MAX_WRITER_COUNT {
                return AcquireOutcome::MustWait;
            }
            let next = bump_offset(incr_writer(current), len);
            match self.control.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return AcquireOutcome::Acquired {
                        offset: next_offset(current),
                        guard: WriterGuard { segment: self },
                    }
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Copy `data` into the segment at `offset`.
    ///
    /// The caller must hold a `WriterGuard` covering the range.
    pub(crate) fn write_bytes(&self, offset: usize, data: &[u8]) {
        debug_assert!(offset + data.len() <= self.size);
        // Exclusive ownership of the range is granted by try_acquire.
        unsafe {
            let buf = &mut *self.buf.get();
            buf[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    /// Set the sealed bit. Returns the final payload size, or `None` if the
    /// segment was already sealed. A seal that observes zero writers moves
    /// the segment to `Io` itself; otherwise the last exiting writer does.
    pub(crate) fn try_seal(&self) -> Option<u64> {
        let mut current = self.control.load(Ordering::Acquire);
        loop {
            if is_sealed(current) {
                return None;
            }
            let next = with_sealed(current);
            match self.control.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if writer_count(next) == 0 {
                        self.transition_open_to_io();
                    }
                    self.notify();
                    return Some(next_offset(next));
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Release one writer slot. Returns true when this writer moved the
    /// segment to `Io` (caller wakes the flusher).
    fn on_writer_exit(&self) -> bool {
        let mut current = self.control.load(Ordering::Acquire);
        loop {
            debug_assert!(writer_count(current) > 0);
            let next = decr_writer(current);
            match self.control.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if is_sealed(next) && writer_count(next) == 0 {
                        self.transition_open_to_io();
                        return true;
                    }
                    return false;
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn transition_open_to_io(&self) {
        let _ = self.state.compare_exchange(
            SegmentState::Open as u8,
            SegmentState::Io as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Reopen a free segment at `start_lsn`, resetting the control word.
    pub(crate) fn open_at(&self, start_lsn: u64) {
        debug_assert_eq!(self.state(), SegmentState::Free);
        self.control.store(0, Ordering::Release);
        self.start_lsn.store(start_lsn, Ordering::Release);
        self.state
            .store(SegmentState::Open as u8, Ordering::Release);
    }

    /// Recycle after the flusher has persisted the payload.
    pub(crate) fn free(&self) {
        let _ = self.state.compare_exchange(
            SegmentState::Io as u8,
            SegmentState::Free as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.notify();
    }

    /// The sealed payload. Only valid in the `Io` state.
    pub(crate) fn sealed_payload(&self) -> &[u8] {
        debug_assert_eq!(self.state(), SegmentState::Io);
        let len = self.pending_offset() as usize;
        // Io means sealed with zero writers; nothing mutates the buffer.
        unsafe { &(&*self.buf.get())[..len] }
    }

    pub(crate) fn notify(&self) {
        let _guard = self.signal_lock.lock();
        self.signal.notify_all();
    }

    /// Park until notified or `timeout` elapses.
    pub(crate) fn wait_signal(&self, timeout: Duration) {
        let mut guard = self.signal_lock.lock();
        let _ = self.signal.wait_for(&mut guard, timeout);
    }
}

pub(crate) struct WriterGuard<'a> {
    segment: &'a LogSegment,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        if self.segment.on_writer_exit() {
            self.segment.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_claims_get_disjoint_offsets() {
        let segment = LogSegment::new(1024);
        segment.open_at(0);

        let (off_a, guard_a) = match segment.try_acquire(100) {
            AcquireOutcome::Acquired { offset, guard } => (offset, guard),
            _ => panic!("expected acquisition"),
        };
        let (off_b, guard_b) = match segment.try_acquire(100) {
            AcquireOutcome::Acquired { offset, guard } => (offset, guard),
            _ => panic!("expected acquisition"),
        };
        let mut offsets = [off_a, off_b];
        offsets.sort_unstable();
        assert_eq!(offsets, [0, 100]);
        assert_eq!(writer_count(segment.control.load(Ordering::Acquire)), 2);

        // does not fit: no control word change
        assert!(matches!(
            segment.try_acquire(2000),
            AcquireOutcome::MustSeal
        ));
        assert_eq!(segment.pending_offset(), 200);

        drop(guard_a);
        drop(guard_b);
        assert_eq!(writer_count(segment.control.load(Ordering::Acquire)), 0);

        assert_eq!(segment.try_seal(), Some(200));
        assert_eq!(segment.try_seal(), None);
    }

    #[test]
    fn test_last_writer_moves_sealed_segment_to_io() {
        let segment = LogSegment::new(256);
        segment.open_at(0);
        let guard = match segment.try_acquire(64) {
            AcquireOutcome::Acquired { guard, .. } => guard,
            _ => panic!("expected acquisition"),
        };
        assert_eq!(segment.try_seal(), Some(64));
        // writer still active, not yet handed to the flusher
        assert_eq!(segment.state(), SegmentState::Open);
        drop(guard);
        assert_eq!(segment.state(), SegmentState::Io);
    }

    #[test]
    fn test_seal_with_no_writers_goes_straight_to_io() {
        let segment = LogSegment::new(256);
        segment.open_at(0);
        {
            let AcquireOutcome::Acquired { offset, guard } = segment.try_acquire(16) else {
                panic!("expected acquisition");
            };
            segment.write_bytes(offset as usize, &[7u8; 16]);
            drop(guard);
        }
        assert_eq!(segment.try_seal(), Some(16));
        assert_eq!(segment.state(), SegmentState::Io);
        assert_eq!(segment.sealed_payload(), &[7u8; 16]);
    }

    #[test]
    fn test_sealed_segment_rejects_writers() {
        let segment = LogSegment::new(256);
        segment.open_at(0);
        segment.try_seal();
        assert!(matches!(segment.try_acquire(8), AcquireOutcome::MustSeal));
    }

    #[test]
    fn test_segment_sized_to_one_record_is_valid() {
        let segment = LogSegment::new(32);
        segment.open_at(0);
        let AcquireOutcome::Acquired { offset, guard } = segment.try_acquire(32) else {
            panic!("expected acquisition");
        };
        assert_eq!(offset, 0);
        drop(guard);
        assert!(matches!(segment.try_acquire(1), AcquireOutcome::MustSeal));
        assert_eq!(segment.try_seal(), Some(32));
    }

    #[test]
    fn test_reopen_resets_control_word() {
        let segment = LogSegment::new(128);
        segment.open_at(0);
        let AcquireOutcome::Acquired { guard, .. } = segment.try_acquire(100) else {
            panic!("expected acquisition");
        };
        drop(guard);
        segment.try_seal();
        segment.free();
        segment.open_at(100);
        assert_eq!(segment.state(), SegmentState::Open);
        assert_eq!(segment.start_lsn(), 100);
        assert_eq!(segment.pending_offset(), 0);
    }
}
