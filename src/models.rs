// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Remote-confirmation state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Exists only locally; its create has never been acknowledged.
    LocalOnly,
    /// Known to the remote, but local edits are queued and unacknowledged.
    Pending,
    /// Remote state matches the local revision.
    Confirmed,
    /// Local/remote divergence or a terminal remote rejection; the record
    /// stays visibly "not saved" until resolved.
    Conflicted,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalOnly => "local_only",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Conflicted => "conflicted",
        }
    }
}

impl TryFrom<&str> for SyncStatus {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "local_only" => Ok(Self::LocalOnly),
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "conflicted" => Ok(Self::Conflicted),
            other => Err(LedgerError::Validation(format!(
                "unknown sync status '{other}'"
            ))),
        }
    }
}

/// A transaction in minor units. The sign of `amount_minor` encodes
/// income (positive) vs. expense (negative). `date` is the user-assigned
/// date; `updated_at` is the wall-clock revision time used for conflict
/// tie-breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub date: NaiveDate,
    pub amount_minor: i64,
    pub category_id: Option<Uuid>,
    pub note: Option<String>,
    pub revision: u64,
    pub sync_status: SyncStatus,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Period bucket (`YYYY-MM`) the transaction falls into.
    pub fn period(&self) -> String {
        self.date.format("%Y-%m").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimit {
    pub amount_minor: i64,
    /// `YYYY-MM` period the limit applies to.
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub label: String,
    pub budget_limit: Option<BudgetLimit>,
    pub revision: u64,
    pub sync_status: SyncStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl TryFrom<&str> for ChangeOp {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(LedgerError::Validation(format!(
                "unknown change op '{other}'"
            ))),
        }
    }
}

/// Full-state copy of a record at mutation time. The change log stores
/// these so later edits cannot retroactively alter a queued change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordSnapshot {
    Transaction(Transaction),
    Category(Category),
}

impl RecordSnapshot {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Transaction(t) => t.id,
            Self::Category(c) => c.id,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            Self::Transaction(t) => t.revision,
            Self::Category(c) => c.revision,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Transaction(t) => t.updated_at,
            Self::Category(c) => c.updated_at,
        }
    }
}

/// A queued local mutation awaiting remote acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub seq: u64,
    pub op: ChangeOp,
    pub record_id: Uuid,
    pub snapshot: RecordSnapshot,
}

/// A change pulled from the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDelta {
    pub op: ChangeOp,
    pub record_id: Uuid,
    pub snapshot: RecordSnapshot,
}

/// Per-entry outcome of a push, aligned by index with the submitted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PushOutcome {
    Accepted,
    Rejected { reason: String },
    Conflict,
}

/// Notification delivered to subscribers after accepted state changes,
/// batched per facade operation or reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    Applied { id: Uuid, op: ChangeOp },
    Confirmed { id: Uuid },
    Conflicted { id: Uuid },
    Rejected { id: Uuid, reason: String },
    Purged { id: Uuid },
    Rebuilt,
}
