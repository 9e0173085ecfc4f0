// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, NaiveDate, Utc};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{
    BudgetLimit, Category, ChangeEntry, ChangeOp, RecordSnapshot, SyncStatus, Transaction,
};

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Pocketledger", "pocketledger"));

pub fn db_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2).ok_or_else(|| {
        LedgerError::Validation("could not determine platform-specific data dir".to_string())
    })?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir)
        .map_err(|e| LedgerError::Validation(format!("failed to create data dir: {e}")))?;
    Ok(data_dir.join("pocketledger.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    open_at(&db_path()?)
}

pub fn open_at(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    init_schema(&mut conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    init_schema(&mut conn)?;
    Ok(conn)
}

fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS categories(
        id TEXT PRIMARY KEY,
        label TEXT NOT NULL UNIQUE,
        budget_amount_minor INTEGER,
        budget_period TEXT,
        revision INTEGER NOT NULL,
        sync_status TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS transactions(
        id TEXT PRIMARY KEY,
        date TEXT NOT NULL,
        amount_minor INTEGER NOT NULL,
        category_id TEXT,
        note TEXT,
        revision INTEGER NOT NULL,
        sync_status TEXT NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(category_id) REFERENCES categories(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);

    CREATE TABLE IF NOT EXISTS change_log(
        seq INTEGER PRIMARY KEY,
        op TEXT NOT NULL,
        record_id TEXT NOT NULL,
        snapshot TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sync_state(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "#,
    )?;
    Ok(())
}

/// Everything the core needs at startup: ledger snapshot, queued changes,
/// and the last known remote cursor.
pub struct LoadedState {
    pub transactions: Vec<Transaction>,
    pub categories: Vec<Category>,
    pub entries: Vec<ChangeEntry>,
    pub cursor: Option<String>,
    pub next_seq: u64,
}

pub fn load(conn: &Connection) -> Result<LoadedState> {
    let mut categories = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT id, label, budget_amount_minor, budget_period, revision, sync_status, updated_at
             FROM categories ORDER BY label",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(r) = rows.next()? {
            let id: String = r.get(0)?;
            let label: String = r.get(1)?;
            let budget_amount: Option<i64> = r.get(2)?;
            let budget_period: Option<String> = r.get(3)?;
            let revision: i64 = r.get(4)?;
            let status: String = r.get(5)?;
            let updated_at: DateTime<Utc> = r.get(6)?;
            let budget_limit = match (budget_amount, budget_period) {
                (Some(amount_minor), Some(period)) => Some(BudgetLimit {
                    amount_minor,
                    period,
                }),
                _ => None,
            };
            categories.push(Category {
                id: parse_uuid(&id)?,
                label,
                budget_limit,
                revision: revision as u64,
                sync_status: SyncStatus::try_from(status.as_str())?,
                updated_at,
            });
        }
    }

    let mut transactions = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT id, date, amount_minor, category_id, note, revision, sync_status, deleted, updated_at
             FROM transactions ORDER BY date, id",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(r) = rows.next()? {
            let id: String = r.get(0)?;
            let date: NaiveDate = r.get(1)?;
            let amount_minor: i64 = r.get(2)?;
            let category_id: Option<String> = r.get(3)?;
            let note: Option<String> = r.get(4)?;
            let revision: i64 = r.get(5)?;
            let status: String = r.get(6)?;
            let deleted: bool = r.get(7)?;
            let updated_at: DateTime<Utc> = r.get(8)?;
            transactions.push(Transaction {
                id: parse_uuid(&id)?,
                date,
                amount_minor,
                category_id: category_id.as_deref().map(parse_uuid).transpose()?,
                note,
                revision: revision as u64,
                sync_status: SyncStatus::try_from(status.as_str())?,
                deleted,
                updated_at,
            });
        }
    }

    let mut entries = Vec::new();
    {
        let mut stmt =
            conn.prepare("SELECT seq, op, record_id, snapshot FROM change_log ORDER BY seq")?;
        let mut rows = stmt.query([])?;
        while let Some(r) = rows.next()? {
            let seq: i64 = r.get(0)?;
            let op: String = r.get(1)?;
            let record_id: String = r.get(2)?;
            let snapshot: String = r.get(3)?;
            entries.push(ChangeEntry {
                seq: seq as u64,
                op: ChangeOp::try_from(op.as_str())?,
                record_id: parse_uuid(&record_id)?,
                snapshot: serde_json::from_str::<RecordSnapshot>(&snapshot)?,
            });
        }
    }

    let cursor = get_state(conn, "cursor")?;
    let next_seq = match get_state(conn, "next_seq")? {
        Some(v) => v.parse::<u64>().map_err(|_| {
            LedgerError::Validation(format!("corrupt next_seq value '{v}' in sync_state"))
        })?,
        None => entries.last().map(|e| e.seq + 1).unwrap_or(1),
    };

    Ok(LoadedState {
        transactions,
        categories,
        entries,
        cursor,
        next_seq,
    })
}

pub fn get_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM sync_state WHERE key=?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v)
}

pub fn set_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| LedgerError::Validation(format!("invalid uuid '{s}'")))
}
