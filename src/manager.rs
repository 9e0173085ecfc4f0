// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::aggregates::{AggregateIndex, BucketCategory};
use crate::changelog::ChangeLog;
use crate::db;
use crate::error::{LedgerError, Result};
use crate::ledger::{LedgerStore, ListFilter, Mutation};
use crate::models::{
    BudgetLimit, Category, ChangeOp, LedgerEvent, RecordSnapshot, SyncStatus, Transaction,
};

pub type Listener = Arc<dyn Fn(&[LedgerEvent]) + Send + Sync>;

/// All mutable state under one owner: ledger, change log, aggregate index
/// and the sqlite connection. Every facade operation and every sync phase
/// holds the surrounding mutex for its whole step; network I/O never runs
/// under it.
pub struct Core {
    pub(crate) conn: Connection,
    pub(crate) ledger: LedgerStore,
    pub(crate) changelog: ChangeLog,
    pub(crate) aggregates: AggregateIndex,
    pub(crate) cursor: Option<String>,
    pub(crate) listeners: Vec<Listener>,
}

impl Core {
    pub(crate) fn set_cursor(&mut self, cursor: String) -> Result<()> {
        db::set_state(&self.conn, "cursor", &cursor)?;
        self.cursor = Some(cursor);
        Ok(())
    }
}

pub type SharedCore = Arc<Mutex<Core>>;

pub(crate) fn lock_core(core: &SharedCore) -> MutexGuard<'_, Core> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn deliver(listeners: &[Listener], events: &[LedgerEvent]) {
    if events.is_empty() {
        return;
    }
    for listener in listeners {
        listener(events);
    }
}

/// Snapshot of the affected record plus the aggregates it touched,
/// returned by every mutating facade operation.
#[derive(Debug, Clone)]
pub struct AppliedChange {
    pub transaction: Transaction,
    pub aggregates: AggregateSummary,
}

#[derive(Debug, Clone)]
pub struct AggregateSummary {
    pub running_balance: i64,
    /// All-category total for the transaction's period.
    pub period_total: i64,
    /// Per-category total for the period, when the record is categorized.
    pub category_total: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BudgetReportRow {
    pub category: Category,
    /// Net signed sum for the month (spend is negative).
    pub net_minor: i64,
    pub limit_minor: Option<i64>,
    /// `limit + net` when a limit applies to the month.
    pub remaining_minor: Option<i64>,
}

/// The public API surface. All user intents go through here: validate,
/// apply to the ledger, update the aggregate index, queue the change, and
/// notify subscribers. No other mutation path exists.
pub struct BudgetManager {
    core: SharedCore,
}

impl BudgetManager {
    /// Loads ledger, change log and cursor from local storage and rebuilds
    /// the aggregate index (it is derived state and never persisted).
    pub fn open(conn: Connection) -> Result<Self> {
        let loaded = db::load(&conn)?;
        let ledger = LedgerStore::from_snapshot(loaded.transactions, loaded.categories);
        let changelog = ChangeLog::from_snapshot(loaded.entries, loaded.next_seq);
        let mut aggregates = AggregateIndex::new();
        aggregates.rebuild(&ledger);
        Ok(Self {
            core: Arc::new(Mutex::new(Core {
                conn,
                ledger,
                changelog,
                aggregates,
                cursor: loaded.cursor,
                listeners: Vec::new(),
            })),
        })
    }

    /// Handle for the sync engine; shares the same exclusive lock.
    pub fn handle(&self) -> SharedCore {
        Arc::clone(&self.core)
    }

    /// Registers a callback invoked after every accepted state change,
    /// batched per operation or reconciliation pass.
    pub fn subscribe(&self, listener: impl Fn(&[LedgerEvent]) + Send + Sync + 'static) {
        lock_core(&self.core).listeners.push(Arc::new(listener));
    }

    pub fn add_transaction(
        &self,
        date: NaiveDate,
        amount_minor: i64,
        category_id: Option<Uuid>,
        note: Option<String>,
    ) -> Result<AppliedChange> {
        self.apply_transaction_mutation(Mutation::Create {
            id: Uuid::new_v4(),
            date,
            amount_minor,
            category_id,
            note,
        })
    }

    pub fn edit_transaction(
        &self,
        id: Uuid,
        expected_revision: u64,
        date: NaiveDate,
        amount_minor: i64,
        category_id: Option<Uuid>,
        note: Option<String>,
    ) -> Result<AppliedChange> {
        self.apply_transaction_mutation(Mutation::Update {
            id,
            expected_revision,
            date,
            amount_minor,
            category_id,
            note,
        })
    }

    pub fn delete_transaction(&self, id: Uuid, expected_revision: u64) -> Result<AppliedChange> {
        self.apply_transaction_mutation(Mutation::Delete {
            id,
            expected_revision,
        })
    }

    fn apply_transaction_mutation(&self, mutation: Mutation) -> Result<AppliedChange> {
        let op = match &mutation {
            Mutation::Create { .. } => ChangeOp::Create,
            Mutation::Update { .. } => ChangeOp::Update,
            Mutation::Delete { .. } => ChangeOp::Delete,
        };
        let (change, events, listeners) = {
            let mut guard = lock_core(&self.core);
            let core = &mut *guard;
            let sql = core.conn.unchecked_transaction()?;
            let applied = core.ledger.stage(&sql, mutation)?;
            let entry = core.changelog.stage(
                &sql,
                op,
                RecordSnapshot::Transaction(applied.after.clone()),
            )?;
            sql.commit()?;
            // In-memory state moves only after the durable write commits.
            core.ledger.commit_staged(&applied);
            core.changelog.commit_staged(entry);
            core.aggregates
                .apply_change(applied.before.as_ref(), Some(&applied.after));
            let events = vec![LedgerEvent::Applied {
                id: applied.after.id,
                op,
            }];
            let change = AppliedChange {
                aggregates: summarize(core, &applied.after),
                transaction: applied.after,
            };
            (change, events, core.listeners.clone())
        };
        deliver(&listeners, &events);
        Ok(change)
    }

    pub fn add_category(&self, label: &str) -> Result<Category> {
        let category = Category {
            id: Uuid::new_v4(),
            label: label.trim().to_string(),
            budget_limit: None,
            revision: 1,
            sync_status: SyncStatus::LocalOnly,
            updated_at: Utc::now(),
        };
        let (category, events, listeners) = {
            let mut guard = lock_core(&self.core);
            let core = &mut *guard;
            let sql = core.conn.unchecked_transaction()?;
            let category = core.ledger.stage_insert_category(&sql, category)?;
            let entry = core.changelog.stage(
                &sql,
                ChangeOp::Create,
                RecordSnapshot::Category(category.clone()),
            )?;
            sql.commit()?;
            core.ledger.commit_category(category.clone());
            core.changelog.commit_staged(entry);
            let events = vec![LedgerEvent::Applied {
                id: category.id,
                op: ChangeOp::Create,
            }];
            (category, events, core.listeners.clone())
        };
        deliver(&listeners, &events);
        Ok(category)
    }

    /// Sets (or replaces) a category's budget limit for a `YYYY-MM`
    /// period. Flows through the change log like any other mutation.
    pub fn set_budget_limit(
        &self,
        category_id: Uuid,
        period: &str,
        amount_minor: i64,
    ) -> Result<Category> {
        validate_period(period)?;
        if amount_minor <= 0 {
            return Err(LedgerError::Validation(
                "budget limit must be positive".to_string(),
            ));
        }
        let (category, events, listeners) = {
            let mut guard = lock_core(&self.core);
            let core = &mut *guard;
            let mut category = core
                .ledger
                .category(category_id)
                .cloned()
                .ok_or_else(|| {
                    LedgerError::Validation(format!("category {category_id} not found"))
                })?;
            category.budget_limit = Some(BudgetLimit {
                amount_minor,
                period: period.to_string(),
            });
            category.revision += 1;
            category.updated_at = Utc::now();
            category.sync_status = match category.sync_status {
                SyncStatus::Confirmed => SyncStatus::Pending,
                other => other,
            };
            let sql = core.conn.unchecked_transaction()?;
            let category = core.ledger.stage_update_category(&sql, category)?;
            let entry = core.changelog.stage(
                &sql,
                ChangeOp::Update,
                RecordSnapshot::Category(category.clone()),
            )?;
            sql.commit()?;
            core.ledger.commit_category(category.clone());
            core.changelog.commit_staged(entry);
            let events = vec![LedgerEvent::Applied {
                id: category.id,
                op: ChangeOp::Update,
            }];
            (category, events, core.listeners.clone())
        };
        deliver(&listeners, &events);
        Ok(category)
    }

    pub fn get_transaction(&self, id: Uuid) -> Option<Transaction> {
        lock_core(&self.core).ledger.get(id).cloned()
    }

    pub fn list_transactions(&self, filter: &ListFilter) -> Vec<Transaction> {
        lock_core(&self.core)
            .ledger
            .list(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn categories(&self) -> Vec<Category> {
        lock_core(&self.core).ledger.categories()
    }

    pub fn category_by_label(&self, label: &str) -> Option<Category> {
        lock_core(&self.core).ledger.category_by_label(label).cloned()
    }

    pub fn running_balance(&self) -> i64 {
        lock_core(&self.core).aggregates.running_balance()
    }

    pub fn category_total(&self, category_id: Uuid, period: &str) -> i64 {
        lock_core(&self.core)
            .aggregates
            .category_total(BucketCategory::Category(category_id), period)
    }

    pub fn period_total(&self, period: &str) -> i64 {
        lock_core(&self.core)
            .aggregates
            .category_total(BucketCategory::All, period)
    }

    pub fn pending_changes(&self) -> usize {
        lock_core(&self.core).changelog.len()
    }

    pub fn cursor(&self) -> Option<String> {
        lock_core(&self.core).cursor.clone()
    }

    /// Per-category totals vs. budget limits for a month.
    pub fn budget_report(&self, month: &str) -> Result<Vec<BudgetReportRow>> {
        validate_period(month)?;
        let guard = lock_core(&self.core);
        let mut rows = Vec::new();
        for category in guard.ledger.categories() {
            let net_minor = guard
                .aggregates
                .category_total(BucketCategory::Category(category.id), month);
            let limit_minor = category
                .budget_limit
                .as_ref()
                .filter(|b| b.period == month)
                .map(|b| b.amount_minor);
            rows.push(BudgetReportRow {
                remaining_minor: limit_minor.map(|l| l + net_minor),
                net_minor,
                limit_minor,
                category,
            });
        }
        Ok(rows)
    }

    /// Checks the aggregate checksum against the ledger and rebuilds on
    /// mismatch. Returns whether a rebuild ran.
    pub fn verify_aggregates(&self) -> bool {
        let (rebuilt, listeners) = {
            let mut guard = lock_core(&self.core);
            let core = &mut *guard;
            let rebuilt = core.aggregates.ensure_consistent(&core.ledger);
            (rebuilt, core.listeners.clone())
        };
        if rebuilt {
            deliver(&listeners, &[LedgerEvent::Rebuilt]);
        }
        rebuilt
    }
}

fn summarize(core: &Core, tx: &Transaction) -> AggregateSummary {
    let period = tx.period();
    AggregateSummary {
        running_balance: core.aggregates.running_balance(),
        period_total: core
            .aggregates
            .category_total(BucketCategory::All, &period),
        category_total: tx
            .category_id
            .map(|c| core.aggregates.category_total(BucketCategory::Category(c), &period)),
    }
}

fn validate_period(period: &str) -> Result<()> {
    NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d").map_err(|_| {
        LedgerError::Validation(format!("invalid period '{period}', expected YYYY-MM"))
    })?;
    Ok(())
}
