// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the ledger core.
///
/// `Validation` and `StaleRevision` are returned synchronously to facade
/// callers. `Transport` and `Conflict` stay inside the sync engine unless
/// they become terminal. `Divergence` triggers an automatic aggregate
/// rebuild and is only visible if the rebuild itself fails.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("stale revision for {id}: expected {expected}, found {actual}")]
    StaleRevision { id: Uuid, expected: u64, actual: u64 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("mutation rejected by remote for {id}: {reason}")]
    Rejected { id: Uuid, reason: String },
    #[error("aggregate divergence: ledger ({ledger_count}, {ledger_total}) vs index ({index_count}, {index_total})")]
    Divergence {
        ledger_count: u64,
        ledger_total: i64,
        index_count: u64,
        index_total: i64,
    },
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

impl PartialEq for LedgerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (
                Self::StaleRevision {
                    id: a,
                    expected: ae,
                    actual: aa,
                },
                Self::StaleRevision {
                    id: b,
                    expected: be,
                    actual: ba,
                },
            ) => a == b && ae == be && aa == ba,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Transport(a), Self::Transport(b)) => a == b,
            (
                Self::Rejected { id: a, reason: ar },
                Self::Rejected { id: b, reason: br },
            ) => a == b && ar == br,
            (Self::Divergence { .. }, Self::Divergence { .. }) => {
                self.to_string() == other.to_string()
            }
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            (Self::Serialize(a), Self::Serialize(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
