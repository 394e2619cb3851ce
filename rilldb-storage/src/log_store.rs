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

//! Append-only log store over a ring of segments
//!
//! Writers append batches of records without taking a mutex: the open
//! segment's control word hands out disjoint byte ranges, and a batch that
//! does not fit seals the segment and opens the next one. A single
//! background flusher walks the ring in order, appending each sealed
//! segment to the log file, fsyncing, and recycling the buffer.
//!
//! ```text
//! writers ──► [open segment] ─seal─► [Io] ──► flusher ──► <dir>/log
//!                   ▲                               │ fsync
//!                   └──────────── recycle ◄─────────┘
//! ```
//!
//! LSNs are byte positions: a segment opened at `start_lsn` ends at
//! `start_lsn + sealed_offset`, and the next segment starts there, so LSNs
//! are strictly monotonic across the ring. `persistent_lsn` trails behind,
//! advanced only after fsync.
//!
//! Append and sync failures are not recoverable; the process terminates.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use rilldb_core::{Result, RillError};

use crate::log_segment::{AcquireOutcome, LogSegment, SegmentState};

pub const DEFAULT_SEGMENT_COUNT: usize = 4;
pub const DEFAULT_SEGMENT_SIZE: usize = 1 << 20;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Bytes of framing added to each appended record.
pub const RECORD_FRAME_LEN: usize = 4;

#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    pub segment_count: usize,
    pub segment_size: usize,
    pub flush_interval: Duration,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            segment_count: DEFAULT_SEGMENT_COUNT,
            segment_size: DEFAULT_SEGMENT_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl LogStoreConfig {
    pub fn with_segment_count(mut self, count: usize) -> Self {
        self.segment_count = count.max(2);
        self
    }

    pub fn with_segment_size(mut self, size: usize) -> Self {
        self.segment_size = size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

/// Byte range a batch occupies in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LsnRange {
    pub start_lsn: u64,
    pub end_lsn: u64,
}

struct LogStoreInner {
    segments: Box<[LogSegment]>,
    /// Index of the open segment.
    current: AtomicUsize,
    file: File,
    stopped: AtomicBool,
    persistent_lsn: AtomicU64,
    flush_interval: Duration,
    segment_size: usize,
}

pub struct LogStore {
    inner: Arc<LogStoreInner>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl LogStore {
    /// Create `<dir>/log` and start the background flusher.
    pub fn open(dir: impl AsRef<Path>, config: LogStoreConfig) -> Result<LogStore> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("log"))?;

        let segments: Box<[LogSegment]> = (0..config.segment_count.max(2))
            .map(|_| LogSegment::new(config.segment_size))
            .collect();
        segments[0].open_at(0);

        let inner = Arc::new(LogStoreInner {
            segments,
            current: AtomicUsize::new(0),
            file,
            stopped: AtomicBool::new(false),
            persistent_lsn: AtomicU64::new(0),
            flush_interval: config.flush_interval,
            segment_size: config.segment_size,
        });

        let flusher = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("rilldb-log-flush".into())
                .spawn(move || flush_loop(&inner))?
        };

        info!(dir = %dir.display(), segments = inner.segments.len(), "log store opened");
        Ok(LogStore {
            inner,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// Append a batch of records, each framed with a `u32` length prefix.
    /// The batch occupies one contiguous LSN range in a single segment.
    pub fn append_records(&self, records: &[Bytes]) -> Result<LsnRange> {
        if records.is_empty() {
            return Err(RillError::InvalidArgument("empty log batch".into()));
        }
        let total: u64 = records
            .iter()
            .map(|r| (RECORD_FRAME_LEN + r.len()) as u64)
            .sum();
        if total > self.inner.segment_size as u64 {
            return Err(RillError::InvalidArgument(format!(
                "log batch of {} bytes exceeds segment size {}",
                total, self.inner.segment_size
            )));
        }

        loop {
            let idx = self.inner.current.load(Ordering::Acquire);
            let segment = &self.inner.segments[idx];
            if segment.state() != SegmentState::Open {
                // rotation in flight; the opener advances `current`
                segment.wait_signal(Duration::from_millis(1));
                continue;
            }
            match segment.try_acquire(total) {
                AcquireOutcome::Acquired { offset, guard } => {
                    let mut pos = offset as usize;
                    for record in records {
                        segment.write_bytes(pos, &(record.len() as u32).to_le_bytes());
                        pos += RECORD_FRAME_LEN;
                        segment.write_bytes(pos, record);
                        pos += record.len();
                    }
                    let start_lsn = segment.start_lsn() + offset;
                    drop(guard);
                    return Ok(LsnRange {
                        start_lsn,
                        end_lsn: start_lsn + total,
                    });
                }
                AcquireOutcome::MustSeal => {
                    // losing the seal race parks until the winner opens the
                    // next segment
                    if !seal_and_open(&self.inner, idx) {
                        segment.wait_signal(Duration::from_millis(1));
                    }
                }
                AcquireOutcome::MustWait => {
                    thread::yield_now();
                }
            }
        }
    }

    /// LSN up to which the log is known durable (advanced after fsync).
    pub fn persistent_lsn(&self) -> u64 {
        self.inner.persistent_lsn.load(Ordering::Acquire)
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.inner.stopped.store(true, Ordering::Release);
        for segment in self.inner.segments.iter() {
            segment.notify();
        }
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("segments", &self.inner.segments.len())
            .field("segment_size", &self.inner.segment_size)
            .field("persistent_lsn", &self.persistent_lsn())
            .finish()
    }
}

/// Seal segment `idx` and open its successor. The writer or flusher that
/// wins the seal race is responsible for opening the next segment at
/// `start_lsn + sealed_offset`; losers return false and retry on the new
/// open segment.
fn seal_and_open(inner: &LogStoreInner, idx: usize) -> bool {
    if inner.current.load(Ordering::Acquire) != idx {
        // rotation already happened; retry on the new open segment
        return false;
    }
    let segment = &inner.segments[idx];
    let Some(sealed_offset) = segment.try_seal() else {
        return false;
    };
    let end_lsn = segment.start_lsn() + sealed_offset;
    let next = (idx + 1) % inner.segments.len();
    let successor = &inner.segments[next];
    // The successor may still be waiting on the flusher.
    while successor.state() != SegmentState::Free {
        successor.wait_signal(inner.flush_interval);
    }
    successor.open_at(end_lsn);
    inner.current.store(next, Ordering::Release);
    // wake writers parked on the sealed segment
    segment.notify();
    debug!(sealed = idx, opened = next, start_lsn = end_lsn, "log segment rotated");
    true
}

fn flush_segment(inner: &LogStoreInner, segment: &LogSegment) {
    let payload = segment.sealed_payload();
    let result = (&inner.file)
        .write_all(payload)
        .and_then(|_| inner.file.sync_data());
    if let Err(e) = result {
        error!(error = %e, "log append/sync failed");
        std::process::abort();
    }
    inner
        .persistent_lsn
        .store(segment.start_lsn() + payload.len() as u64, Ordering::Release);
    segment.free();
}

fn flush_loop(inner: &LogStoreInner) {
    let ring = inner.segments.len();
    let mut io_idx = 0usize;
    while !inner.stopped.load(Ordering::Acquire) {
        let segment = &inner.segments[io_idx];
        if segment.state() == SegmentState::Io {
            flush_segment(inner, segment);
            io_idx = (io_idx + 1) % ring;
            continue;
        }
        segment.wait_signal(inner.flush_interval);
        if inner.stopped.load(Ordering::Acquire) {
            break;
        }
        if segment.state() != SegmentState::Io {
            // Idle wakeup: roll the open segment forward so its records
            // reach disk without waiting for it to fill. Skipped when the
            // successor is not free yet, which would stall this loop.
            let current = inner.current.load(Ordering::Acquire);
            let open = &inner.segments[current];
            let successor = &inner.segments[(current + 1) % ring];
            if open.state() == SegmentState::Open
                && open.pending_offset() > 0
                && successor.state() == SegmentState::Free
            {
                seal_and_open(inner, current);
            }
        }
    }

    // drain: persist whatever is sealed or still open
    let current = inner.current.load(Ordering::Acquire);
    let open = &inner.segments[current];
    if open.state() == SegmentState::Open && open.pending_offset() > 0 {
        // all writers are gone by the time the store shuts down
        let _ = open.try_seal();
    }
    for _ in 0..ring {
        let segment = &inner.segments[io_idx];
        if segment.state() == SegmentState::Io {
            flush_segment(inner, segment);
        }
        io_idx = (io_idx + 1) % ring;
    }
}
