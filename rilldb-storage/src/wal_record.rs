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

//! Transaction log records
//!
//! Three record kinds mark a transaction's lifecycle in the log: `Begin`
//! and `Abort` carry the read timestamp, `Commit` additionally carries the
//! commit timestamp. Each record ends with a crc32 of the preceding bytes;
//! the log store frames records with a `u32` length prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use rilldb_core::{Result, RillError, TxnTs};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalRecordKind {
    Begin = 1,
    Commit = 2,
    Abort = 3,
}

impl TryFrom<u8> for WalRecordKind {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(WalRecordKind::Begin),
            2 => Ok(WalRecordKind::Commit),
            3 => Ok(WalRecordKind::Abort),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnLogRecord {
    pub kind: WalRecordKind,
    pub read_ts: TxnTs,
    /// Present for `Commit` records only.
    pub commit_ts: Option<TxnTs>,
}

impl TxnLogRecord {
    pub fn begin(read_ts: TxnTs) -> Self {
        Self {
            kind: WalRecordKind::Begin,
            read_ts,
            commit_ts: None,
        }
    }

    pub fn commit(read_ts: TxnTs, commit_ts: TxnTs) -> Self {
        Self {
            kind: WalRecordKind::Commit,
            read_ts,
            commit_ts: Some(commit_ts),
        }
    }

    pub fn abort(read_ts: TxnTs) -> Self {
        Self {
            kind: WalRecordKind::Abort,
            read_ts,
            commit_ts: None,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + 8 + 8 + 4);
        buf.put_u8(self.kind as u8);
        buf.put_u64_le(self.read_ts);
        if let Some(commit_ts) = self.commit_ts {
            buf.put_u64_le(commit_ts);
        }
        let checksum = crc32fast::hash(&buf);
        buf.put_u32_le(checksum);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<TxnLogRecord> {
        let short = || RillError::Serialization("truncated log record".into());
        if data.len() < 1 + 8 + 4 {
            return Err(short());
        }
        let kind = WalRecordKind::try_from(data[0])
            .map_err(|_| RillError::Serialization(format!("unknown log record kind {}", data[0])))?;
        let body_len = match kind {
            WalRecordKind::Commit => 1 + 8 + 8,
            _ => 1 + 8,
        };
        if data.len() != body_len + 4 {
            return Err(short());
        }
        let stored = (&data[body_len..]).get_u32_le();
        if crc32fast::hash(&data[..body_len]) != stored {
            return Err(RillError::Serialization(
                "log record checksum mismatch".into(),
            ));
        }
        let read_ts = (&data[1..9]).get_u64_le();
        let commit_ts = match kind {
            WalRecordKind::Commit => Some((&data[9..17]).get_u64_le()),
            _ => None,
        };
        Ok(TxnLogRecord {
            kind,
            read_ts,
            commit_ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        for record in [
            TxnLogRecord::begin(5),
            TxnLogRecord::commit(5, 9),
            TxnLogRecord::abort(5),
        ] {
            let encoded = record.encode();
            assert_eq!(TxnLogRecord::decode(&encoded).unwrap(), record);
        }
    }

    #[test]
    fn test_commit_record_is_longer() {
        assert_eq!(TxnLogRecord::begin(1).encode().len(), 13);
        assert_eq!(TxnLogRecord::commit(1, 2).encode().len(), 21);
    }

    #[test]
    fn test_corrupt_record_rejected() {
        let mut raw = TxnLogRecord::commit(5, 9).encode().to_vec();
        raw[3] ^= 0xff;
        assert!(TxnLogRecord::decode(&raw).is_err());
        assert!(TxnLogRecord::decode(&raw[..4]).is_err());
        raw[0] = 200;
        assert!(TxnLogRecord::decode(&raw).is_err());
    }
}
