// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Store failure modes (spec §4.1 "Failure semantics" / §7 `StoreWriteError`).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opening database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("migration to version {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },

    /// Write failures (spec §7 `StoreWriteError`): carries the SQL operation
    /// name so callers can report a contextual error. No partial state leaks
    /// because the write is wrapped in `BEGIN ... COMMIT` with rollback on
    /// error (spec §4.1).
    #[error("store write failed during {operation}: {source}")]
    Write {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("row not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
