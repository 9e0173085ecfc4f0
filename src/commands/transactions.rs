// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::db::parse_uuid;
use crate::ledger::ListFilter;
use crate::manager::BudgetManager;
use crate::utils::{fmt_minor, maybe_print_json, parse_amount_minor, parse_date, pretty_table};
use anyhow::{anyhow, Result};
use serde::Serialize;

pub fn handle(manager: &BudgetManager, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(manager, sub)?,
        Some(("edit", sub)) => edit(manager, sub)?,
        Some(("delete", sub)) => delete(manager, sub)?,
        Some(("list", sub)) => list(manager, sub)?,
        _ => {}
    }
    Ok(())
}

fn category_id_for(manager: &BudgetManager, label: &str) -> Result<uuid::Uuid> {
    manager
        .category_by_label(label)
        .map(|c| c.id)
        .ok_or_else(|| anyhow!("Category '{}' not found", label))
}

fn add(manager: &BudgetManager, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let amount = parse_amount_minor(sub.get_one::<String>("amount").unwrap())?;
    let category_id = sub
        .get_one::<String>("category")
        .map(|label| category_id_for(manager, label))
        .transpose()?;
    let note = sub.get_one::<String>("note").cloned();

    let change = manager.add_transaction(date, amount, category_id, note)?;
    println!(
        "Recorded {} on {} (id: {}, balance: {})",
        fmt_minor(change.transaction.amount_minor),
        change.transaction.date,
        change.transaction.id,
        fmt_minor(change.aggregates.running_balance),
    );
    Ok(())
}

fn edit(manager: &BudgetManager, sub: &clap::ArgMatches) -> Result<()> {
    let id = parse_uuid(sub.get_one::<String>("id").unwrap())?;
    let current = manager
        .get_transaction(id)
        .ok_or_else(|| anyhow!("Transaction {} not found", id))?;

    let date = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => current.date,
    };
    let amount = match sub.get_one::<String>("amount") {
        Some(s) => parse_amount_minor(s)?,
        None => current.amount_minor,
    };
    let category_id = match sub.get_one::<String>("category") {
        Some(label) => Some(category_id_for(manager, label)?),
        None => current.category_id,
    };
    let note = sub.get_one::<String>("note").cloned().or(current.note);

    let change = manager.edit_transaction(id, current.revision, date, amount, category_id, note)?;
    println!(
        "Updated {} (rev {}, balance: {})",
        change.transaction.id,
        change.transaction.revision,
        fmt_minor(change.aggregates.running_balance),
    );
    Ok(())
}

fn delete(manager: &BudgetManager, sub: &clap::ArgMatches) -> Result<()> {
    let id = parse_uuid(sub.get_one::<String>("id").unwrap())?;
    let current = manager
        .get_transaction(id)
        .ok_or_else(|| anyhow!("Transaction {} not found", id))?;
    let change = manager.delete_transaction(id, current.revision)?;
    println!(
        "Deleted {} (queued for remote confirmation, balance: {})",
        id,
        fmt_minor(change.aggregates.running_balance),
    );
    Ok(())
}

#[derive(Serialize)]
pub struct TransactionRow {
    pub id: String,
    pub date: String,
    pub amount: String,
    pub category: String,
    pub note: String,
    pub sync: String,
}

fn list(manager: &BudgetManager, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");

    let filter = ListFilter {
        month: sub.get_one::<String>("month").cloned(),
        category_id: sub
            .get_one::<String>("category")
            .map(|label| category_id_for(manager, label))
            .transpose()?,
        include_deleted: sub.get_flag("all"),
    };

    let categories = manager.categories();
    let label_of = |id: Option<uuid::Uuid>| -> String {
        id.and_then(|id| categories.iter().find(|c| c.id == id))
            .map(|c| c.label.clone())
            .unwrap_or_default()
    };

    let data: Vec<TransactionRow> = manager
        .list_transactions(&filter)
        .into_iter()
        .map(|t| TransactionRow {
            id: t.id.to_string(),
            date: t.date.to_string(),
            amount: fmt_minor(t.amount_minor),
            category: label_of(t.category_id),
            note: t.note.clone().unwrap_or_default(),
            sync: t.sync_status.as_str().to_string(),
        })
        .collect();

    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.clone(),
                    r.date.clone(),
                    r.amount.clone(),
                    r.category.clone(),
                    r.note.clone(),
                    r.sync.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Id", "Date", "Amount", "Category", "Note", "Sync"], rows)
        );
    }
    Ok(())
}
