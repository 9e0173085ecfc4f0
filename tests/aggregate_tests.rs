// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use pocketledger::aggregates::{AggregateIndex, Bucket, BucketCategory, BucketKey};
use pocketledger::db;
use pocketledger::error::LedgerError;
use pocketledger::ledger::{LedgerStore, Mutation};
use pocketledger::manager::BudgetManager;
use uuid::Uuid;

fn setup() -> BudgetManager {
    BudgetManager::open(db::open_in_memory().unwrap()).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn category_total_follows_add_edit_delete() {
    let manager = setup();
    let cat = manager.add_category("groceries").unwrap();

    let added = manager
        .add_transaction(date("2024-01-05"), -2500, Some(cat.id), None)
        .unwrap();
    assert_eq!(manager.category_total(cat.id, "2024-01"), -2500);
    assert_eq!(added.aggregates.category_total, Some(-2500));

    manager
        .edit_transaction(
            added.transaction.id,
            1,
            date("2024-01-05"),
            -1800,
            Some(cat.id),
            None,
        )
        .unwrap();
    assert_eq!(manager.category_total(cat.id, "2024-01"), -1800);

    manager.delete_transaction(added.transaction.id, 2).unwrap();
    assert_eq!(manager.category_total(cat.id, "2024-01"), 0);
    assert_eq!(manager.period_total("2024-01"), 0);
    assert_eq!(manager.running_balance(), 0);
}

#[test]
fn uncategorized_transactions_count_toward_all_only() {
    let manager = setup();
    let cat = manager.add_category("rent").unwrap();
    manager
        .add_transaction(date("2024-03-01"), -90000, Some(cat.id), None)
        .unwrap();
    manager
        .add_transaction(date("2024-03-02"), 250000, None, None)
        .unwrap();

    assert_eq!(manager.period_total("2024-03"), 160000);
    assert_eq!(manager.category_total(cat.id, "2024-03"), -90000);
    assert_eq!(manager.running_balance(), 160000);
}

#[test]
fn moving_a_transaction_between_periods_moves_its_contribution() {
    let manager = setup();
    let added = manager
        .add_transaction(date("2024-01-31"), -500, None, None)
        .unwrap();
    manager
        .edit_transaction(added.transaction.id, 1, date("2024-02-01"), -500, None, None)
        .unwrap();

    assert_eq!(manager.period_total("2024-01"), 0);
    assert_eq!(manager.period_total("2024-02"), -500);
    assert_eq!(manager.running_balance(), -500);
}

#[test]
fn delta_maintenance_matches_full_rebuild() {
    let manager = setup();
    let cat = manager.add_category("groceries").unwrap();
    let a = manager
        .add_transaction(date("2024-01-05"), -2500, Some(cat.id), None)
        .unwrap();
    manager
        .add_transaction(date("2024-01-07"), 120000, None, None)
        .unwrap();
    manager
        .edit_transaction(a.transaction.id, 1, date("2024-01-05"), -1800, Some(cat.id), None)
        .unwrap();
    let b = manager
        .add_transaction(date("2024-02-14"), -4200, Some(cat.id), None)
        .unwrap();
    manager.delete_transaction(b.transaction.id, 1).unwrap();

    // A healthy index never triggers a rebuild.
    assert!(!manager.verify_aggregates());
    assert_eq!(manager.running_balance(), 118200);
    assert_eq!(manager.category_total(cat.id, "2024-01"), -1800);
    assert_eq!(manager.category_total(cat.id, "2024-02"), 0);
}

#[test]
fn verify_reports_divergence_and_rebuild_recovers() {
    let conn = db::open_in_memory().unwrap();
    let mut ledger = LedgerStore::default();
    let mut index = AggregateIndex::new();

    let applied = ledger
        .apply(
            &conn,
            Mutation::Create {
                id: Uuid::new_v4(),
                date: date("2024-01-05"),
                amount_minor: -2500,
                category_id: None,
                note: None,
            },
        )
        .unwrap();
    index.apply_change(None, Some(&applied.after));
    assert!(index.verify(&ledger).is_ok());

    // Mutate the ledger behind the index's back to force a mismatch.
    ledger
        .apply(
            &conn,
            Mutation::Create {
                id: Uuid::new_v4(),
                date: date("2024-01-06"),
                amount_minor: -700,
                category_id: None,
                note: None,
            },
        )
        .unwrap();
    let err = index.verify(&ledger).unwrap_err();
    assert!(matches!(err, LedgerError::Divergence { .. }));

    assert!(index.ensure_consistent(&ledger));
    assert!(index.verify(&ledger).is_ok());
    assert_eq!(index.running_balance(), -3200);
    assert_eq!(index.record_count(), 2);
}

#[test]
fn emptied_buckets_are_dropped() {
    let manager = setup();
    let added = manager
        .add_transaction(date("2024-01-05"), -2500, None, None)
        .unwrap();
    manager.delete_transaction(added.transaction.id, 1).unwrap();

    // Direct check through the index types: the bucket reads as empty.
    let mut index = AggregateIndex::new();
    index.apply_change(None, Some(&added.transaction));
    let mut tombstone = added.transaction.clone();
    tombstone.deleted = true;
    index.apply_change(Some(&added.transaction), Some(&tombstone));
    assert_eq!(
        index.bucket(&BucketKey {
            category: BucketCategory::All,
            period: "2024-01".to_string(),
        }),
        Bucket::default()
    );
    assert_eq!(index.buckets().count(), 0);
    assert!(index.verify(&LedgerStore::default()).is_ok());
}
