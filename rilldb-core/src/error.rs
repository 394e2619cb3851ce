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

//! Error types for RillDB

use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RillError {
    #[error("row not found")]
    NotFound,

    #[error("write intent conflict: {0}")]
    Conflict(String),

    #[error("transaction aborted: {0}")]
    TxnAborted(String),

    #[error("lock wait timed out after {0:?}")]
    LockTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RillError {
    /// True for the "row absent at the requested timestamp" read outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RillError::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RillError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, RillError>;
