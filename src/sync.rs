// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LedgerError, Result};
use crate::manager::{deliver, lock_core, Core, SharedCore};
use crate::models::{
    ChangeEntry, ChangeOp, LedgerEvent, PushOutcome, RecordSnapshot, RemoteDelta, SyncStatus,
};
use serde::{Deserialize, Serialize};

/// Remote changes since a cursor, plus the cursor to resume from next
/// time. The wire schema behind this is out of core scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    pub deltas: Vec<RemoteDelta>,
    pub cursor: String,
}

/// The remote persistence service, seen only through this contract.
pub trait RemoteService {
    fn pull_changes(&self, since: Option<&str>) -> Result<PullResponse>;
    fn push_batch(&self, entries: &[ChangeEntry]) -> Result<Vec<PushOutcome>>;
}

/// Supplies the opaque credential attached to remote calls. `refresh` is
/// invoked once when the remote signals an expired session.
pub trait SessionProvider: Send + Sync {
    fn token(&self) -> Result<String>;
    fn refresh(&self) -> Result<String>;
}

/// Fixed token, e.g. from a CLI flag. Cannot refresh, so an expired
/// session surfaces as a transport error.
pub struct StaticSession {
    token: String,
}

impl StaticSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl SessionProvider for StaticSession {
    fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    fn refresh(&self) -> Result<String> {
        Err(LedgerError::Transport(
            "session expired and static token cannot refresh".to_string(),
        ))
    }
}

/// Cooperative cancellation for background sync. Checked at phase
/// boundaries; a cancelled push neither acknowledges nor drops its
/// in-flight batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Max change-log entries per push, for transport efficiency.
    pub batch_size: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Idle delay between reconciliation passes.
    pub pass_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            pass_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
pub struct PassSummary {
    pub pulled: usize,
    pub acknowledged: usize,
    pub rebuilt: bool,
    /// Transient failure recorded for backoff; the pass itself still
    /// returns Ok and local state stays valid.
    pub transport_error: Option<String>,
}

/// Bidirectional reconciliation between the change log / ledger and the
/// remote service. One pass = pull phase (apply remote deltas under the
/// conflict policy) then push phase (drain a batch, acknowledge or
/// requeue). Network calls run with the core lock released so local
/// writes are never blocked by a slow or hung remote.
pub struct SyncEngine<R: RemoteService> {
    core: SharedCore,
    remote: R,
    config: SyncConfig,
    failures: u32,
}

impl<R: RemoteService> SyncEngine<R> {
    pub fn new(core: SharedCore, remote: R, config: SyncConfig) -> Self {
        Self {
            core,
            remote,
            config,
            failures: 0,
        }
    }

    /// Runs one reconciliation pass. Transient transport failures are
    /// recorded in the summary (for backoff), not returned as errors.
    /// Events collected before a fatal error still reach subscribers:
    /// the state changes behind them were already applied.
    pub fn run_pass(&mut self, token: &CancelToken) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        let mut events = Vec::new();

        if token.is_cancelled() {
            return Ok(summary);
        }

        let result = self.run_phases(token, &mut summary, &mut events);

        if summary.transport_error.is_some() {
            self.failures += 1;
        } else if result.is_ok() {
            self.failures = 0;
        }

        let listeners = lock_core(&self.core).listeners.clone();
        deliver(&listeners, &events);
        result.map(|_| summary)
    }

    fn run_phases(
        &mut self,
        token: &CancelToken,
        summary: &mut PassSummary,
        events: &mut Vec<LedgerEvent>,
    ) -> Result<()> {
        match self.pull_phase(events) {
            Ok((pulled, rebuilt)) => {
                summary.pulled = pulled;
                summary.rebuilt = rebuilt;
            }
            Err(LedgerError::Transport(msg)) => {
                summary.transport_error = Some(msg);
            }
            Err(e) => return Err(e),
        }

        if summary.transport_error.is_none() && !token.is_cancelled() {
            let (acked, transport_error) = self.push_phase(token, events)?;
            summary.acknowledged = acked;
            summary.transport_error = transport_error;
        }
        Ok(())
    }

    /// Capped exponential backoff for the next retry.
    pub fn backoff_delay(&self) -> Duration {
        if self.failures == 0 {
            return self.config.pass_interval;
        }
        let exp = self.failures.saturating_sub(1).min(16);
        let delay = self.config.base_backoff.saturating_mul(1u32 << exp);
        delay.min(self.config.max_backoff)
    }

    /// Background loop: pass, sleep (idle interval or backoff), repeat
    /// until cancelled. Sleeps in short slices so cancellation is prompt.
    pub fn run_until_cancelled(&mut self, token: &CancelToken) -> Result<()> {
        while !token.is_cancelled() {
            self.run_pass(token)?;
            let delay = self.backoff_delay();
            let slice = Duration::from_millis(50);
            let mut slept = Duration::ZERO;
            while slept < delay && !token.is_cancelled() {
                std::thread::sleep(slice.min(delay - slept));
                slept += slice;
            }
        }
        Ok(())
    }

    fn pull_phase(&mut self, events: &mut Vec<LedgerEvent>) -> Result<(usize, bool)> {
        let cursor = lock_core(&self.core).cursor.clone();
        let resp = self.remote.pull_changes(cursor.as_deref())?;
        let pulled = resp.deltas.len();

        let mut guard = lock_core(&self.core);
        let core = &mut *guard;
        let mut conflicts = Vec::new();
        for delta in resp.deltas {
            apply_remote_delta(core, delta, events, &mut conflicts)?;
        }
        for delta in conflicts {
            resolve_conflict(core, delta, events)?;
        }
        core.set_cursor(resp.cursor)?;
        // Conflict resolution can touch several records at once; cheap
        // checksum catches any slip and falls back to a full rebuild.
        let rebuilt = core.aggregates.ensure_consistent(&core.ledger);
        if rebuilt {
            events.push(LedgerEvent::Rebuilt);
        }
        Ok((pulled, rebuilt))
    }

    fn push_phase(
        &mut self,
        token: &CancelToken,
        events: &mut Vec<LedgerEvent>,
    ) -> Result<(usize, Option<String>)> {
        let batch = lock_core(&self.core)
            .changelog
            .peek_batch(self.config.batch_size);
        let Some(first_seq) = batch.first().map(|e| e.seq) else {
            return Ok((0, None));
        };

        // Network call with the lock released.
        let outcomes = self.remote.push_batch(&batch);

        let mut guard = lock_core(&self.core);
        let core = &mut *guard;

        if token.is_cancelled() {
            core.changelog.requeue(first_seq);
            return Ok((0, None));
        }

        let outcomes = match outcomes {
            Ok(outcomes) => outcomes,
            Err(LedgerError::Transport(msg)) => {
                core.changelog.requeue(first_seq);
                return Ok((0, Some(msg)));
            }
            Err(e) => return Err(e),
        };

        let mut acked = 0usize;
        // acknowledge() removes everything up to a sequence number, so it
        // is only safe while no earlier entry was retained for retry.
        let mut prefix_clean = true;
        for (entry, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                PushOutcome::Accepted => {
                    if prefix_clean {
                        core.changelog.acknowledge(&core.conn, entry.seq)?;
                    } else {
                        core.changelog.remove(&core.conn, entry.seq)?;
                    }
                    acked += 1;
                    finalize_acknowledged(core, entry, events)?;
                }
                PushOutcome::Rejected { reason } => {
                    // Terminal: never retried, surfaced to the user with
                    // the record flagged as not saved.
                    core.changelog.remove(&core.conn, entry.seq)?;
                    mark_conflicted(core, entry)?;
                    events.push(LedgerEvent::Rejected {
                        id: entry.record_id,
                        reason,
                    });
                    prefix_clean = false;
                }
                PushOutcome::Conflict => {
                    // Remote saw a newer revision; keep the entry and let
                    // the next pull bring the remote state for resolution.
                    mark_conflicted(core, entry)?;
                    events.push(LedgerEvent::Conflicted {
                        id: entry.record_id,
                    });
                    prefix_clean = false;
                }
            }
        }
        Ok((acked, None))
    }
}

fn has_local_pending(core: &Core, snapshot: &RecordSnapshot) -> bool {
    let id = snapshot.id();
    let status = match snapshot {
        RecordSnapshot::Transaction(_) => core.ledger.get(id).map(|t| t.sync_status),
        RecordSnapshot::Category(_) => core.ledger.category(id).map(|c| c.sync_status),
    };
    status.is_some_and(|s| s != SyncStatus::Confirmed) || core.changelog.pending_for(id)
}

/// Applies one remote delta. Records with unacknowledged local changes are
/// marked conflicted and retained (both versions) for the resolution step
/// that runs at the end of the pull phase.
fn apply_remote_delta(
    core: &mut Core,
    delta: RemoteDelta,
    events: &mut Vec<LedgerEvent>,
    conflicts: &mut Vec<RemoteDelta>,
) -> Result<()> {
    match &delta.snapshot {
        RecordSnapshot::Transaction(snap) => {
            let local = core.ledger.get(delta.record_id).cloned();
            match local {
                None => {
                    if delta.op == ChangeOp::Delete || snap.deleted {
                        // Already purged or never seen; replay is a no-op.
                        return Ok(());
                    }
                    let (_, after) = core.ledger.merge_remote(&core.conn, snap.clone())?;
                    core.aggregates.apply_change(None, Some(&after));
                    events.push(LedgerEvent::Applied {
                        id: after.id,
                        op: ChangeOp::Create,
                    });
                }
                Some(local) => {
                    if has_local_pending(core, &delta.snapshot) {
                        core.ledger.set_sync_status(
                            &core.conn,
                            local.id,
                            SyncStatus::Conflicted,
                        )?;
                        events.push(LedgerEvent::Conflicted { id: local.id });
                        conflicts.push(delta);
                        return Ok(());
                    }
                    if delta.snapshot.revision() <= local.revision {
                        // Idempotence: already-applied delta replayed.
                        return Ok(());
                    }
                    if delta.op == ChangeOp::Delete || snap.deleted {
                        core.aggregates.apply_change(Some(&local), None);
                        core.ledger.purge(&core.conn, local.id)?;
                        events.push(LedgerEvent::Purged { id: local.id });
                    } else {
                        let (_, after) = core.ledger.merge_remote(&core.conn, snap.clone())?;
                        core.aggregates.apply_change(Some(&local), Some(&after));
                        events.push(LedgerEvent::Applied {
                            id: after.id,
                            op: ChangeOp::Update,
                        });
                    }
                }
            }
        }
        RecordSnapshot::Category(snap) => {
            let local = core.ledger.category(delta.record_id).cloned();
            match local {
                None => {
                    if delta.op != ChangeOp::Delete {
                        let after = core.ledger.merge_remote_category(&core.conn, snap.clone())?;
                        events.push(LedgerEvent::Applied {
                            id: after.id,
                            op: ChangeOp::Create,
                        });
                    }
                }
                Some(local) => {
                    if has_local_pending(core, &delta.snapshot) {
                        core.ledger.set_category_sync_status(
                            &core.conn,
                            local.id,
                            SyncStatus::Conflicted,
                        )?;
                        events.push(LedgerEvent::Conflicted { id: local.id });
                        conflicts.push(delta);
                        return Ok(());
                    }
                    if delta.snapshot.revision() <= local.revision {
                        return Ok(());
                    }
                    let after = core.ledger.merge_remote_category(&core.conn, snap.clone())?;
                    events.push(LedgerEvent::Applied {
                        id: after.id,
                        op: ChangeOp::Update,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Resolution policy for records retained as conflicted during the pull
/// phase: last-writer-wins by wall-clock `updated_at`, except deletions
/// always win over concurrent edits. A deleted record is never
/// resurrected by a stale edit.
fn resolve_conflict(
    core: &mut Core,
    delta: RemoteDelta,
    events: &mut Vec<LedgerEvent>,
) -> Result<()> {
    match delta.snapshot {
        RecordSnapshot::Transaction(snap) => {
            let Some(local) = core.ledger.get(delta.record_id).cloned() else {
                return Ok(());
            };
            let remote_deleted = delta.op == ChangeOp::Delete || snap.deleted;
            if remote_deleted {
                // Remote delete beats local edits; stale queued edits for
                // the record must not be replayed afterwards.
                core.changelog.remove_for_record(&core.conn, local.id)?;
                core.aggregates.apply_change(Some(&local), None);
                core.ledger.purge(&core.conn, local.id)?;
                events.push(LedgerEvent::Purged { id: local.id });
            } else if local.deleted {
                // Local tombstone beats the remote edit; the queued delete
                // stays and will push on a later pass.
                core.ledger
                    .set_sync_status(&core.conn, local.id, SyncStatus::Pending)?;
            } else if snap.updated_at > local.updated_at {
                let mut winner = snap;
                // Keep the per-record revision monotonic even when the
                // remote's counter is behind the local one.
                winner.revision = winner.revision.max(local.revision);
                core.changelog.remove_for_record(&core.conn, local.id)?;
                let (_, after) = core.ledger.merge_remote(&core.conn, winner)?;
                core.aggregates.apply_change(Some(&local), Some(&after));
                events.push(LedgerEvent::Applied {
                    id: after.id,
                    op: ChangeOp::Update,
                });
            } else {
                // Local edit wins; its queued entries push as usual.
                core.ledger
                    .set_sync_status(&core.conn, local.id, SyncStatus::Pending)?;
            }
        }
        RecordSnapshot::Category(snap) => {
            let Some(local) = core.ledger.category(delta.record_id).cloned() else {
                return Ok(());
            };
            if snap.updated_at > local.updated_at {
                let mut winner = snap;
                winner.revision = winner.revision.max(local.revision);
                core.changelog.remove_for_record(&core.conn, local.id)?;
                let after = core.ledger.merge_remote_category(&core.conn, winner)?;
                events.push(LedgerEvent::Applied {
                    id: after.id,
                    op: ChangeOp::Update,
                });
            } else {
                core.ledger
                    .set_category_sync_status(&core.conn, local.id, SyncStatus::Pending)?;
            }
        }
    }
    Ok(())
}

/// After the remote durably stored an entry: confirm the record once its
/// last queued entry is acknowledged, and purge tombstones whose deletion
/// the remote now holds.
fn finalize_acknowledged(
    core: &mut Core,
    entry: &ChangeEntry,
    events: &mut Vec<LedgerEvent>,
) -> Result<()> {
    if core.changelog.pending_for(entry.record_id) {
        return Ok(());
    }
    match &entry.snapshot {
        RecordSnapshot::Transaction(snap) => {
            let Some(local) = core.ledger.get(entry.record_id).cloned() else {
                return Ok(());
            };
            if local.deleted && local.revision <= snap.revision {
                core.ledger.purge(&core.conn, local.id)?;
                events.push(LedgerEvent::Purged { id: local.id });
            } else if local.revision == snap.revision {
                core.ledger
                    .set_sync_status(&core.conn, local.id, SyncStatus::Confirmed)?;
                events.push(LedgerEvent::Confirmed { id: local.id });
            }
        }
        RecordSnapshot::Category(snap) => {
            let Some(local) = core.ledger.category(entry.record_id).cloned() else {
                return Ok(());
            };
            if local.revision == snap.revision {
                core.ledger
                    .set_category_sync_status(&core.conn, local.id, SyncStatus::Confirmed)?;
                events.push(LedgerEvent::Confirmed { id: local.id });
            }
        }
    }
    Ok(())
}

fn mark_conflicted(core: &mut Core, entry: &ChangeEntry) -> Result<()> {
    match &entry.snapshot {
        RecordSnapshot::Transaction(_) => {
            core.ledger
                .set_sync_status(&core.conn, entry.record_id, SyncStatus::Conflicted)
        }
        RecordSnapshot::Category(_) => core.ledger.set_category_sync_status(
            &core.conn,
            entry.record_id,
            SyncStatus::Conflicted,
        ),
    }
}

/// HTTP client for the remote persistence service. Timeouts are set on
/// the underlying client; an expired session (401) triggers one token
/// refresh and retry before failing.
pub struct HttpRemote {
    base_url: String,
    client: reqwest::blocking::Client,
    session: Box<dyn SessionProvider>,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, session: Box<dyn SessionProvider>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: crate::utils::http_client()?,
            session,
        })
    }

    fn send_with_auth(
        &self,
        build: impl Fn(&str) -> reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response> {
        let token = self.session.token()?;
        let resp = build(&token)
            .send()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            let token = self.session.refresh()?;
            let resp = build(&token)
                .send()
                .map_err(|e| LedgerError::Transport(e.to_string()))?;
            return resp
                .error_for_status()
                .map_err(|e| LedgerError::Transport(e.to_string()));
        }
        resp.error_for_status()
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }
}

impl RemoteService for HttpRemote {
    fn pull_changes(&self, since: Option<&str>) -> Result<PullResponse> {
        let url = format!("{}/changes", self.base_url);
        let resp = self.send_with_auth(|token| {
            let mut req = self.client.get(&url).bearer_auth(token);
            if let Some(cursor) = since {
                req = req.query(&[("since", cursor)]);
            }
            req
        })?;
        resp.json::<PullResponse>()
            .map_err(|e| LedgerError::Transport(format!("invalid pull response: {e}")))
    }

    fn push_batch(&self, entries: &[ChangeEntry]) -> Result<Vec<PushOutcome>> {
        let url = format!("{}/changes", self.base_url);
        let resp =
            self.send_with_auth(|token| self.client.post(&url).bearer_auth(token).json(&entries))?;
        let outcomes = resp
            .json::<Vec<PushOutcome>>()
            .map_err(|e| LedgerError::Transport(format!("invalid push response: {e}")))?;
        if outcomes.len() != entries.len() {
            return Err(LedgerError::Transport(format!(
                "push returned {} outcomes for {} entries",
                outcomes.len(),
                entries.len()
            )));
        }
        Ok(outcomes)
    }
}
