// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::ledger::LedgerStore;
use crate::models::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketCategory {
    All,
    Category(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub category: BucketCategory,
    /// `YYYY-MM` period.
    pub period: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bucket {
    pub sum_minor: i64,
    pub count: u64,
}

/// Incrementally maintained rollups over the ledger: per-category and
/// all-category sums per period, plus a running balance. Derived state
/// only: never persisted, fully reconstructible via [`rebuild`].
///
/// Invariant: after every accepted mutation each bucket equals the
/// sum/count of non-tombstoned transactions matching its key.
///
/// [`rebuild`]: AggregateIndex::rebuild
#[derive(Debug, Default)]
pub struct AggregateIndex {
    buckets: HashMap<BucketKey, Bucket>,
    record_count: u64,
    total_minor: i64,
}

impl AggregateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, key: &BucketKey) -> Bucket {
        self.buckets.get(key).copied().unwrap_or_default()
    }

    pub fn category_total(&self, category: BucketCategory, period: &str) -> i64 {
        self.bucket(&BucketKey {
            category,
            period: period.to_string(),
        })
        .sum_minor
    }

    /// Signed sum of all non-tombstoned transactions.
    pub fn running_balance(&self) -> i64 {
        self.total_minor
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&BucketKey, &Bucket)> {
        self.buckets.iter()
    }

    /// Applies a mutation by delta instead of rescanning: the old
    /// contribution (if any) is retracted, the new one (if live) added.
    pub fn apply_change(&mut self, before: Option<&Transaction>, after: Option<&Transaction>) {
        if let Some(old) = before {
            if !old.deleted {
                self.retract(old);
            }
        }
        if let Some(new) = after {
            if !new.deleted {
                self.add(new);
            }
        }
    }

    fn add(&mut self, tx: &Transaction) {
        for key in contribution_keys(tx) {
            let bucket = self.buckets.entry(key).or_default();
            bucket.sum_minor += tx.amount_minor;
            bucket.count += 1;
        }
        self.record_count += 1;
        self.total_minor += tx.amount_minor;
    }

    fn retract(&mut self, tx: &Transaction) {
        for key in contribution_keys(tx) {
            if let Some(bucket) = self.buckets.get_mut(&key) {
                bucket.sum_minor -= tx.amount_minor;
                bucket.count = bucket.count.saturating_sub(1);
                if bucket.count == 0 && bucket.sum_minor == 0 {
                    self.buckets.remove(&key);
                }
            }
        }
        self.record_count = self.record_count.saturating_sub(1);
        self.total_minor -= tx.amount_minor;
    }

    /// Full recompute from the ledger. The only recovery path after a
    /// detected divergence.
    pub fn rebuild(&mut self, ledger: &LedgerStore) {
        self.buckets.clear();
        self.record_count = 0;
        self.total_minor = 0;
        for tx in ledger.iter_live() {
            self.add(tx);
        }
    }

    /// Compares the cheap checksum (record count + total signed amount)
    /// against the ledger's independently computed value.
    pub fn verify(&self, ledger: &LedgerStore) -> Result<()> {
        let (ledger_count, ledger_total) = ledger.checksum();
        if ledger_count != self.record_count || ledger_total != self.total_minor {
            return Err(LedgerError::Divergence {
                ledger_count,
                ledger_total,
                index_count: self.record_count,
                index_total: self.total_minor,
            });
        }
        Ok(())
    }

    /// Verifies and rebuilds on mismatch. Returns whether a rebuild ran.
    pub fn ensure_consistent(&mut self, ledger: &LedgerStore) -> bool {
        if self.verify(ledger).is_err() {
            self.rebuild(ledger);
            return true;
        }
        false
    }
}

fn contribution_keys(tx: &Transaction) -> Vec<BucketKey> {
    let period = tx.period();
    let mut keys = vec![BucketKey {
        category: BucketCategory::All,
        period: period.clone(),
    }];
    if let Some(cat) = tx.category_id {
        keys.push(BucketKey {
            category: BucketCategory::Category(cat),
            period,
        });
    }
    keys
}
