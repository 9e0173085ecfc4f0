// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use pocketledger::db;
use pocketledger::error::LedgerError;
use pocketledger::ledger::ListFilter;
use pocketledger::manager::BudgetManager;
use pocketledger::models::{ChangeOp, LedgerEvent};
use tempfile::tempdir;

fn setup() -> BudgetManager {
    BudgetManager::open(db::open_in_memory().unwrap()).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn each_operation_delivers_one_event_batch() {
    let manager = setup();
    let batches: Arc<Mutex<Vec<Vec<LedgerEvent>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&batches);
    manager.subscribe(move |events| {
        seen.lock().unwrap().push(events.to_vec());
    });

    let added = manager
        .add_transaction(date("2024-01-05"), -2500, None, None)
        .unwrap();
    let id = added.transaction.id;
    manager
        .edit_transaction(id, 1, date("2024-01-05"), -1800, None, None)
        .unwrap();
    manager.delete_transaction(id, 2).unwrap();

    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 3);
    assert_eq!(
        batches[0].as_slice(),
        &[LedgerEvent::Applied {
            id,
            op: ChangeOp::Create
        }]
    );
    assert_eq!(
        batches[1].as_slice(),
        &[LedgerEvent::Applied {
            id,
            op: ChangeOp::Update
        }]
    );
    assert_eq!(
        batches[2].as_slice(),
        &[LedgerEvent::Applied {
            id,
            op: ChangeOp::Delete
        }]
    );
}

#[test]
fn rejected_operations_deliver_no_events() {
    let manager = setup();
    let count = Arc::new(Mutex::new(0usize));
    let seen = Arc::clone(&count);
    manager.subscribe(move |_| {
        *seen.lock().unwrap() += 1;
    });

    manager
        .add_transaction(date("2024-01-05"), 0, None, None)
        .unwrap_err();

    assert_eq!(*count.lock().unwrap(), 0);
}

#[test]
fn failed_queue_write_rolls_back_the_whole_operation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.sqlite");
    let manager = BudgetManager::open(db::open_at(&path).unwrap()).unwrap();

    // Occupy the next change-log sequence number out-of-band so the
    // queue insert fails after the transaction row was written.
    let side = db::open_at(&path).unwrap();
    side.execute(
        "INSERT INTO change_log(seq, op, record_id, snapshot) VALUES (1, 'create', 'x', '{}')",
        [],
    )
    .unwrap();

    let result = manager.add_transaction(date("2024-01-05"), -2500, None, None);
    assert!(result.is_err());

    // Memory and storage agree: the record exists in neither.
    assert!(manager.list_transactions(&ListFilter::default()).is_empty());
    assert_eq!(manager.running_balance(), 0);
    assert_eq!(manager.pending_changes(), 0);
    let rows: i64 = side
        .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    assert!(!manager.verify_aggregates());

    // The category path stages the same way.
    let result = manager.add_category("groceries");
    assert!(result.is_err());
    assert!(manager.categories().is_empty());
    let rows: i64 = side
        .query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);

    // Once the collision clears, the same operation goes through.
    side.execute("DELETE FROM change_log", []).unwrap();
    manager
        .add_transaction(date("2024-01-05"), -2500, None, None)
        .unwrap();
    assert_eq!(manager.pending_changes(), 1);
    assert_eq!(manager.running_balance(), -2500);
}

#[test]
fn applied_change_reports_the_touched_aggregates() {
    let manager = setup();
    let cat = manager.add_category("groceries").unwrap();
    manager
        .add_transaction(date("2024-01-02"), 100000, None, None)
        .unwrap();

    let change = manager
        .add_transaction(date("2024-01-05"), -2500, Some(cat.id), None)
        .unwrap();
    assert_eq!(change.aggregates.running_balance, 97500);
    assert_eq!(change.aggregates.period_total, 97500);
    assert_eq!(change.aggregates.category_total, Some(-2500));

    let uncategorized = manager
        .add_transaction(date("2024-01-06"), -100, None, None)
        .unwrap();
    assert_eq!(uncategorized.aggregates.category_total, None);
}

#[test]
fn budget_limit_validation() {
    let manager = setup();
    let cat = manager.add_category("groceries").unwrap();

    let err = manager.set_budget_limit(cat.id, "2024-13", 1000).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = manager.set_budget_limit(cat.id, "2024-01", 0).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = manager
        .set_budget_limit(uuid::Uuid::new_v4(), "2024-01", 1000)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn setting_a_budget_limit_bumps_the_category_revision() {
    let manager = setup();
    let cat = manager.add_category("groceries").unwrap();
    assert_eq!(cat.revision, 1);

    let updated = manager.set_budget_limit(cat.id, "2024-01", 30000).unwrap();
    assert_eq!(updated.revision, 2);
    assert_eq!(
        updated.budget_limit,
        manager
            .category_by_label("groceries")
            .unwrap()
            .budget_limit
    );
}

#[test]
fn budget_report_compares_spend_against_limits() {
    let manager = setup();
    let groceries = manager.add_category("groceries").unwrap();
    let transport = manager.add_category("transport").unwrap();
    manager
        .set_budget_limit(groceries.id, "2024-01", 30000)
        .unwrap();

    manager
        .add_transaction(date("2024-01-05"), -2500, Some(groceries.id), None)
        .unwrap();
    manager
        .add_transaction(date("2024-01-12"), -10000, Some(groceries.id), None)
        .unwrap();
    manager
        .add_transaction(date("2024-01-20"), -4000, Some(transport.id), None)
        .unwrap();

    let rows = manager.budget_report("2024-01").unwrap();
    assert_eq!(rows.len(), 2);

    // Categories come back sorted by label.
    assert_eq!(rows[0].category.label, "groceries");
    assert_eq!(rows[0].net_minor, -12500);
    assert_eq!(rows[0].limit_minor, Some(30000));
    assert_eq!(rows[0].remaining_minor, Some(17500));

    assert_eq!(rows[1].category.label, "transport");
    assert_eq!(rows[1].net_minor, -4000);
    assert_eq!(rows[1].limit_minor, None);
    assert_eq!(rows[1].remaining_minor, None);
}

#[test]
fn budget_report_limit_applies_only_to_its_month() {
    let manager = setup();
    let cat = manager.add_category("groceries").unwrap();
    manager.set_budget_limit(cat.id, "2024-01", 30000).unwrap();
    manager
        .add_transaction(date("2024-02-05"), -2500, Some(cat.id), None)
        .unwrap();

    let rows = manager.budget_report("2024-02").unwrap();
    assert_eq!(rows[0].net_minor, -2500);
    assert_eq!(rows[0].limit_minor, None);
    assert_eq!(rows[0].remaining_minor, None);
}

#[test]
fn overspend_shows_as_negative_remaining() {
    let manager = setup();
    let cat = manager.add_category("groceries").unwrap();
    manager.set_budget_limit(cat.id, "2024-01", 1000).unwrap();
    manager
        .add_transaction(date("2024-01-05"), -2500, Some(cat.id), None)
        .unwrap();

    let rows = manager.budget_report("2024-01").unwrap();
    assert_eq!(rows[0].remaining_minor, Some(-1500));
}
