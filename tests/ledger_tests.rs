// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use pocketledger::db;
use pocketledger::error::LedgerError;
use pocketledger::ledger::ListFilter;
use pocketledger::manager::BudgetManager;
use pocketledger::models::SyncStatus;

fn setup() -> BudgetManager {
    BudgetManager::open(db::open_in_memory().unwrap()).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn add_transaction_is_immediately_visible() {
    let manager = setup();
    let change = manager
        .add_transaction(date("2024-01-05"), -2500, None, None)
        .unwrap();
    assert_eq!(change.transaction.amount_minor, -2500);
    assert_eq!(change.transaction.revision, 1);
    assert_eq!(change.transaction.sync_status, SyncStatus::LocalOnly);

    let listed = manager.list_transactions(&ListFilter::default());
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, change.transaction.id);
}

#[test]
fn zero_amount_is_rejected_before_any_state_change() {
    let manager = setup();
    let err = manager
        .add_transaction(date("2024-01-05"), 0, None, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(manager.list_transactions(&ListFilter::default()).is_empty());
    assert_eq!(manager.pending_changes(), 0);
}

#[test]
fn unknown_category_is_rejected() {
    let manager = setup();
    let err = manager
        .add_transaction(date("2024-01-05"), -100, Some(uuid::Uuid::new_v4()), None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn stale_revision_edit_fails_without_clobbering() {
    let manager = setup();
    let added = manager
        .add_transaction(date("2024-01-05"), -2500, None, None)
        .unwrap();
    let id = added.transaction.id;

    // First edit bumps the revision to 2.
    manager
        .edit_transaction(id, 1, date("2024-01-05"), -1800, None, None)
        .unwrap();

    // Replaying an edit against revision 1 must fail, not overwrite.
    let err = manager
        .edit_transaction(id, 1, date("2024-01-05"), -9999, None, None)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::StaleRevision {
            id,
            expected: 1,
            actual: 2
        }
    );
    assert_eq!(manager.get_transaction(id).unwrap().amount_minor, -1800);
}

#[test]
fn delete_sets_tombstone_and_keeps_change_queued() {
    let manager = setup();
    let added = manager
        .add_transaction(date("2024-01-05"), -2500, None, None)
        .unwrap();
    let id = added.transaction.id;

    manager.delete_transaction(id, 1).unwrap();

    // Hidden from default listings, still present as a tombstone.
    assert!(manager.list_transactions(&ListFilter::default()).is_empty());
    let all = manager.list_transactions(&ListFilter {
        include_deleted: true,
        ..Default::default()
    });
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted);
    assert_eq!(all[0].revision, 2);

    // Create + delete stay queued until the remote acknowledges.
    assert_eq!(manager.pending_changes(), 2);
}

#[test]
fn editing_a_deleted_transaction_fails() {
    let manager = setup();
    let added = manager
        .add_transaction(date("2024-01-05"), -2500, None, None)
        .unwrap();
    let id = added.transaction.id;
    manager.delete_transaction(id, 1).unwrap();

    let err = manager
        .edit_transaction(id, 2, date("2024-01-05"), -100, None, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn listing_is_ordered_by_date_then_id() {
    let manager = setup();
    manager
        .add_transaction(date("2024-02-10"), -100, None, None)
        .unwrap();
    manager
        .add_transaction(date("2024-01-20"), -200, None, None)
        .unwrap();
    let a = manager
        .add_transaction(date("2024-01-20"), -300, None, None)
        .unwrap();
    let b = manager
        .add_transaction(date("2024-01-20"), -400, None, None)
        .unwrap();

    let listed = manager.list_transactions(&ListFilter::default());
    let dates: Vec<NaiveDate> = listed.iter().map(|t| t.date).collect();
    assert_eq!(
        dates,
        vec![
            date("2024-01-20"),
            date("2024-01-20"),
            date("2024-01-20"),
            date("2024-02-10")
        ]
    );
    // Same-date ties break by id for deterministic ordering.
    let tied: Vec<_> = listed.iter().take(3).map(|t| t.id).collect();
    let mut sorted = tied.clone();
    sorted.sort();
    assert_eq!(tied, sorted);
    assert!(tied.contains(&a.transaction.id));
    assert!(tied.contains(&b.transaction.id));
}

#[test]
fn month_and_category_filters_apply() {
    let manager = setup();
    let cat = manager.add_category("groceries").unwrap();
    manager
        .add_transaction(date("2024-01-05"), -2500, Some(cat.id), None)
        .unwrap();
    manager
        .add_transaction(date("2024-02-05"), -1000, Some(cat.id), None)
        .unwrap();
    manager
        .add_transaction(date("2024-01-09"), -700, None, None)
        .unwrap();

    let jan_groceries = manager.list_transactions(&ListFilter {
        month: Some("2024-01".to_string()),
        category_id: Some(cat.id),
        include_deleted: false,
    });
    assert_eq!(jan_groceries.len(), 1);
    assert_eq!(jan_groceries[0].amount_minor, -2500);
}

#[test]
fn duplicate_category_label_is_rejected() {
    let manager = setup();
    manager.add_category("groceries").unwrap();
    let err = manager.add_category("groceries").unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}
