// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{params, Connection};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::db;
use crate::error::Result;
use crate::models::{ChangeEntry, ChangeOp, RecordSnapshot};

/// Append-only FIFO queue of local mutations not yet confirmed by the
/// remote service. Entries are snapshot copies, persisted to the
/// `change_log` table so offline edits survive a restart. Sequence
/// numbers are never reused, even after the log fully drains.
#[derive(Debug)]
pub struct ChangeLog {
    entries: VecDeque<ChangeEntry>,
    next_seq: u64,
    /// Highest sequence number of the batch currently out on the wire.
    /// Cleared by acknowledge or requeue; a cancelled push leaves the
    /// entries untouched either way.
    in_flight: Option<u64>,
}

impl ChangeLog {
    pub fn from_snapshot(entries: Vec<ChangeEntry>, next_seq: u64) -> Self {
        Self {
            entries: entries.into(),
            next_seq,
            in_flight: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter()
    }

    /// Whether any queued entry still targets the given record.
    pub fn pending_for(&self, record_id: Uuid) -> bool {
        self.entries.iter().any(|e| e.record_id == record_id)
    }

    /// Builds the entry under the next sequence number and persists it,
    /// leaving the in-memory queue untouched. The caller hands the entry
    /// to [`commit_staged`] once the surrounding sqlite transaction
    /// commits, so a rollback never leaves a queued entry behind.
    ///
    /// [`commit_staged`]: ChangeLog::commit_staged
    pub fn stage(
        &self,
        conn: &Connection,
        op: ChangeOp,
        snapshot: RecordSnapshot,
    ) -> Result<ChangeEntry> {
        let entry = ChangeEntry {
            seq: self.next_seq,
            op,
            record_id: snapshot.id(),
            snapshot,
        };
        conn.execute(
            "INSERT INTO change_log(seq, op, record_id, snapshot) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.seq as i64,
                entry.op.as_str(),
                entry.record_id.to_string(),
                serde_json::to_string(&entry.snapshot)?,
            ],
        )?;
        db::set_state(conn, "next_seq", &(entry.seq + 1).to_string())?;
        Ok(entry)
    }

    /// Enqueues a staged entry once its row is durable.
    pub fn commit_staged(&mut self, entry: ChangeEntry) {
        self.next_seq = entry.seq + 1;
        self.entries.push_back(entry);
    }

    /// Oldest entries first, capped at `max`. Marks the batch in flight;
    /// entries are not removed until acknowledged, so a failed or
    /// cancelled push loses nothing and retries in original order.
    pub fn peek_batch(&mut self, max: usize) -> Vec<ChangeEntry> {
        let batch: Vec<ChangeEntry> = self.entries.iter().take(max).cloned().collect();
        self.in_flight = batch.last().map(|e| e.seq);
        batch
    }

    /// Removes entries up to and including `seq` after the remote has
    /// durably stored them.
    pub fn acknowledge(&mut self, conn: &Connection, seq: u64) -> Result<()> {
        conn.execute(
            "DELETE FROM change_log WHERE seq<=?1",
            params![seq as i64],
        )?;
        while self.entries.front().is_some_and(|e| e.seq <= seq) {
            self.entries.pop_front();
        }
        if self.in_flight.is_some_and(|hi| hi <= seq) {
            self.in_flight = None;
        }
        Ok(())
    }

    /// Puts the in-flight batch starting at `seq` back on the queue after
    /// a transport failure. Entries were never removed, so original order
    /// is preserved by construction.
    pub fn requeue(&mut self, seq: u64) {
        debug_assert!(self.entries.front().is_none_or(|e| e.seq <= seq));
        self.in_flight = None;
    }

    /// Drops a single entry after a terminal remote rejection.
    pub fn remove(&mut self, conn: &Connection, seq: u64) -> Result<()> {
        conn.execute("DELETE FROM change_log WHERE seq=?1", params![seq as i64])?;
        self.entries.retain(|e| e.seq != seq);
        Ok(())
    }

    /// Drops every queued entry for a record. Used when conflict
    /// resolution decides the remote version wins: stale local edits must
    /// not be replayed afterwards.
    pub fn remove_for_record(&mut self, conn: &Connection, record_id: Uuid) -> Result<()> {
        conn.execute(
            "DELETE FROM change_log WHERE record_id=?1",
            params![record_id.to_string()],
        )?;
        self.entries.retain(|e| e.record_id != record_id);
        Ok(())
    }
}
