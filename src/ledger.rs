// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{Category, SyncStatus, Transaction};

/// A local mutation against the ledger. Update and Delete carry the
/// revision the caller last read; a stale revision fails the mutation so
/// an older edit can never silently clobber a newer one.
#[derive(Debug, Clone)]
pub enum Mutation {
    Create {
        id: Uuid,
        date: NaiveDate,
        amount_minor: i64,
        category_id: Option<Uuid>,
        note: Option<String>,
    },
    Update {
        id: Uuid,
        expected_revision: u64,
        date: NaiveDate,
        amount_minor: i64,
        category_id: Option<Uuid>,
        note: Option<String>,
    },
    Delete {
        id: Uuid,
        expected_revision: u64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category_id: Option<Uuid>,
    /// `YYYY-MM` period filter.
    pub month: Option<String>,
    /// Tombstoned records are hidden unless set.
    pub include_deleted: bool,
}

/// Outcome of an accepted mutation: the record before (if any) and after.
/// The aggregate index consumes both sides to retract the old contribution
/// and add the new one.
#[derive(Debug, Clone)]
pub struct AppliedRecord {
    pub before: Option<Transaction>,
    pub after: Transaction,
}

/// The authoritative in-memory collection of transactions and categories,
/// mirrored row-by-row into sqlite on every accepted mutation.
#[derive(Debug, Default)]
pub struct LedgerStore {
    transactions: BTreeMap<Uuid, Transaction>,
    categories: HashMap<Uuid, Category>,
}

impl LedgerStore {
    pub fn from_snapshot(transactions: Vec<Transaction>, categories: Vec<Category>) -> Self {
        Self {
            transactions: transactions.into_iter().map(|t| (t.id, t)).collect(),
            categories: categories.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    pub fn category(&self, id: Uuid) -> Option<&Category> {
        self.categories.get(&id)
    }

    pub fn category_by_label(&self, label: &str) -> Option<&Category> {
        self.categories.values().find(|c| c.label == label)
    }

    pub fn categories(&self) -> Vec<Category> {
        let mut out: Vec<Category> = self.categories.values().cloned().collect();
        out.sort_by(|a, b| a.label.cmp(&b.label));
        out
    }

    /// Transactions matching the filter, ordered by (date, id) so listings
    /// are deterministic under timestamp ties.
    pub fn list(&self, filter: &ListFilter) -> Vec<&Transaction> {
        let mut out: Vec<&Transaction> = self
            .transactions
            .values()
            .filter(|t| filter.include_deleted || !t.deleted)
            .filter(|t| match filter.category_id {
                Some(cat) => t.category_id == Some(cat),
                None => true,
            })
            .filter(|t| match &filter.month {
                Some(m) => &t.period() == m,
                None => true,
            })
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        out
    }

    pub fn iter_live(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values().filter(|t| !t.deleted)
    }

    /// Non-tombstone record count and total signed amount. The aggregate
    /// index checks its own running values against this to detect
    /// divergence.
    pub fn checksum(&self) -> (u64, i64) {
        let mut count = 0u64;
        let mut total = 0i64;
        for t in self.iter_live() {
            count += 1;
            total += t.amount_minor;
        }
        (count, total)
    }

    /// Applies a local mutation: validates, persists the row, then mutates
    /// the in-memory state. Deletes set a tombstone and bump the revision;
    /// the row is purged only once the remote confirms the deletion.
    pub fn apply(&mut self, conn: &Connection, mutation: Mutation) -> Result<AppliedRecord> {
        let applied = self.stage(conn, mutation)?;
        self.commit_staged(&applied);
        Ok(applied)
    }

    /// Validates the mutation and writes the row, leaving the in-memory
    /// map untouched. Callers wrapping several writes in one sqlite
    /// transaction call [`commit_staged`] after that transaction commits,
    /// so a rollback never leaves a phantom record in memory.
    ///
    /// [`commit_staged`]: LedgerStore::commit_staged
    pub fn stage(&self, conn: &Connection, mutation: Mutation) -> Result<AppliedRecord> {
        match mutation {
            Mutation::Create {
                id,
                date,
                amount_minor,
                category_id,
                note,
            } => {
                if self.transactions.contains_key(&id) {
                    return Err(LedgerError::Validation(format!(
                        "transaction id {id} already exists"
                    )));
                }
                self.validate_fields(amount_minor, category_id)?;
                let tx = Transaction {
                    id,
                    date,
                    amount_minor,
                    category_id,
                    note,
                    revision: 1,
                    sync_status: SyncStatus::LocalOnly,
                    deleted: false,
                    updated_at: Utc::now(),
                };
                upsert_transaction(conn, &tx)?;
                Ok(AppliedRecord {
                    before: None,
                    after: tx,
                })
            }
            Mutation::Update {
                id,
                expected_revision,
                date,
                amount_minor,
                category_id,
                note,
            } => {
                self.validate_fields(amount_minor, category_id)?;
                let before = self.existing(id, expected_revision)?.clone();
                if before.deleted {
                    return Err(LedgerError::Validation(format!(
                        "transaction {id} is deleted"
                    )));
                }
                let mut after = before.clone();
                after.date = date;
                after.amount_minor = amount_minor;
                after.category_id = category_id;
                after.note = note;
                after.revision += 1;
                after.updated_at = Utc::now();
                after.sync_status = next_local_status(before.sync_status);
                upsert_transaction(conn, &after)?;
                Ok(AppliedRecord {
                    before: Some(before),
                    after,
                })
            }
            Mutation::Delete {
                id,
                expected_revision,
            } => {
                let before = self.existing(id, expected_revision)?.clone();
                let mut after = before.clone();
                after.deleted = true;
                after.revision += 1;
                after.updated_at = Utc::now();
                after.sync_status = next_local_status(before.sync_status);
                upsert_transaction(conn, &after)?;
                Ok(AppliedRecord {
                    before: Some(before),
                    after,
                })
            }
        }
    }

    /// Makes a staged mutation visible in memory once its row is durable.
    pub fn commit_staged(&mut self, applied: &AppliedRecord) {
        self.transactions
            .insert(applied.after.id, applied.after.clone());
    }

    /// Overwrites local state with a remote snapshot. Conflict policy is
    /// the sync engine's job; by the time this runs the remote version has
    /// already won. Returns the previous local state.
    pub fn merge_remote(
        &mut self,
        conn: &Connection,
        mut snapshot: Transaction,
    ) -> Result<(Option<Transaction>, Transaction)> {
        snapshot.sync_status = SyncStatus::Confirmed;
        upsert_transaction(conn, &snapshot)?;
        let before = self.transactions.insert(snapshot.id, snapshot.clone());
        Ok((before, snapshot))
    }

    /// Removes a record entirely. Only valid once the remote has durably
    /// confirmed the deletion.
    pub fn purge(&mut self, conn: &Connection, id: Uuid) -> Result<Option<Transaction>> {
        conn.execute("DELETE FROM transactions WHERE id=?1", params![id.to_string()])?;
        Ok(self.transactions.remove(&id))
    }

    pub fn set_sync_status(
        &mut self,
        conn: &Connection,
        id: Uuid,
        status: SyncStatus,
    ) -> Result<()> {
        if let Some(tx) = self.transactions.get_mut(&id) {
            conn.execute(
                "UPDATE transactions SET sync_status=?1 WHERE id=?2",
                params![status.as_str(), id.to_string()],
            )?;
            tx.sync_status = status;
        }
        Ok(())
    }

    /// Validates and writes a new category row; memory picks it up via
    /// [`commit_category`] once the surrounding transaction commits.
    ///
    /// [`commit_category`]: LedgerStore::commit_category
    pub fn stage_insert_category(&self, conn: &Connection, category: Category) -> Result<Category> {
        if category.label.trim().is_empty() {
            return Err(LedgerError::Validation(
                "category label must not be empty".to_string(),
            ));
        }
        if self.category_by_label(&category.label).is_some() {
            return Err(LedgerError::Validation(format!(
                "category '{}' already exists",
                category.label
            )));
        }
        upsert_category(conn, &category)?;
        Ok(category)
    }

    pub fn stage_update_category(&self, conn: &Connection, category: Category) -> Result<Category> {
        if !self.categories.contains_key(&category.id) {
            return Err(LedgerError::Validation(format!(
                "category {} not found",
                category.id
            )));
        }
        upsert_category(conn, &category)?;
        Ok(category)
    }

    pub fn commit_category(&mut self, category: Category) {
        self.categories.insert(category.id, category);
    }

    pub fn merge_remote_category(
        &mut self,
        conn: &Connection,
        mut snapshot: Category,
    ) -> Result<Category> {
        snapshot.sync_status = SyncStatus::Confirmed;
        upsert_category(conn, &snapshot)?;
        self.categories.insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    pub fn set_category_sync_status(
        &mut self,
        conn: &Connection,
        id: Uuid,
        status: SyncStatus,
    ) -> Result<()> {
        if let Some(cat) = self.categories.get_mut(&id) {
            conn.execute(
                "UPDATE categories SET sync_status=?1 WHERE id=?2",
                params![status.as_str(), id.to_string()],
            )?;
            cat.sync_status = status;
        }
        Ok(())
    }

    fn existing(&self, id: Uuid, expected_revision: u64) -> Result<&Transaction> {
        let tx = self
            .transactions
            .get(&id)
            .ok_or_else(|| LedgerError::Validation(format!("transaction {id} not found")))?;
        if tx.revision != expected_revision {
            return Err(LedgerError::StaleRevision {
                id,
                expected: expected_revision,
                actual: tx.revision,
            });
        }
        Ok(tx)
    }

    fn validate_fields(&self, amount_minor: i64, category_id: Option<Uuid>) -> Result<()> {
        if amount_minor == 0 {
            return Err(LedgerError::Validation(
                "amount must be non-zero".to_string(),
            ));
        }
        if let Some(cat) = category_id {
            if !self.categories.contains_key(&cat) {
                return Err(LedgerError::Validation(format!("category {cat} not found")));
            }
        }
        Ok(())
    }
}

/// A record that already has unacknowledged local changes stays in its
/// current state; a confirmed record picks up fresh pending edits.
fn next_local_status(current: SyncStatus) -> SyncStatus {
    match current {
        SyncStatus::Confirmed => SyncStatus::Pending,
        other => other,
    }
}

pub fn upsert_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
    conn.execute(
        "INSERT INTO transactions(id, date, amount_minor, category_id, note, revision, sync_status, deleted, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
           date=excluded.date, amount_minor=excluded.amount_minor,
           category_id=excluded.category_id, note=excluded.note,
           revision=excluded.revision, sync_status=excluded.sync_status,
           deleted=excluded.deleted, updated_at=excluded.updated_at",
        params![
            tx.id.to_string(),
            tx.date,
            tx.amount_minor,
            tx.category_id.map(|c| c.to_string()),
            tx.note,
            tx.revision as i64,
            tx.sync_status.as_str(),
            tx.deleted,
            tx.updated_at,
        ],
    )?;
    Ok(())
}

pub fn upsert_category(conn: &Connection, cat: &Category) -> Result<()> {
    conn.execute(
        "INSERT INTO categories(id, label, budget_amount_minor, budget_period, revision, sync_status, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
           label=excluded.label, budget_amount_minor=excluded.budget_amount_minor,
           budget_period=excluded.budget_period, revision=excluded.revision,
           sync_status=excluded.sync_status, updated_at=excluded.updated_at",
        params![
            cat.id.to_string(),
            cat.label,
            cat.budget_limit.as_ref().map(|b| b.amount_minor),
            cat.budget_limit.as_ref().map(|b| b.period.clone()),
            cat.revision as i64,
            cat.sync_status.as_str(),
            cat.updated_at,
        ],
    )?;
    Ok(())
}
