// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::ListFilter;
use crate::manager::BudgetManager;
use crate::utils::fmt_minor;
use anyhow::Result;
use serde_json::json;

pub fn handle(manager: &BudgetManager, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => export_transactions(manager, sub),
        _ => Ok(()),
    }
}

fn export_transactions(manager: &BudgetManager, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = sub.get_one::<String>("format").unwrap().to_lowercase();
    let out = sub.get_one::<String>("out").unwrap();

    let categories = manager.categories();
    let label_of = |id: Option<uuid::Uuid>| -> String {
        id.and_then(|id| categories.iter().find(|c| c.id == id))
            .map(|c| c.label.clone())
            .unwrap_or_default()
    };
    let transactions = manager.list_transactions(&ListFilter::default());

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record(["id", "date", "amount", "category", "note", "sync"])?;
            for t in &transactions {
                wtr.write_record([
                    t.id.to_string(),
                    t.date.to_string(),
                    fmt_minor(t.amount_minor),
                    label_of(t.category_id),
                    t.note.clone().unwrap_or_default(),
                    t.sync_status.as_str().to_string(),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let mut items = Vec::new();
            for t in &transactions {
                items.push(json!({
                    "id": t.id, "date": t.date, "amount_minor": t.amount_minor,
                    "category": label_of(t.category_id), "note": t.note,
                    "sync": t.sync_status.as_str()
                }));
            }
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        _ => {
            eprintln!("Unknown format: {} (use csv|json)", fmt);
        }
    }
    println!("Exported transactions to {}", out);
    Ok(())
}
