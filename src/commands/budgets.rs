// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::manager::BudgetManager;
use crate::utils::{fmt_minor, maybe_print_json, parse_amount_minor, parse_month, pretty_table};
use anyhow::{anyhow, Result};
use serde::Serialize;

pub fn handle(manager: &BudgetManager, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => set(manager, sub)?,
        Some(("report", sub)) => report(manager, sub)?,
        _ => {}
    }
    Ok(())
}

fn set(manager: &BudgetManager, sub: &clap::ArgMatches) -> Result<()> {
    let month = parse_month(sub.get_one::<String>("month").unwrap())?;
    let label = sub.get_one::<String>("category").unwrap();
    let amount = parse_amount_minor(sub.get_one::<String>("amount").unwrap())?;
    let category = manager
        .category_by_label(label)
        .ok_or_else(|| anyhow!("Category '{}' not found", label))?;
    manager.set_budget_limit(category.id, &month, amount)?;
    println!(
        "Budget set for {} / {} = {}",
        month,
        label,
        fmt_minor(amount)
    );
    Ok(())
}

#[derive(Serialize)]
struct ReportRow {
    category: String,
    budget: Option<String>,
    net: String,
    remaining: Option<String>,
}

fn report(manager: &BudgetManager, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let month = parse_month(sub.get_one::<String>("month").unwrap())?;

    let data: Vec<ReportRow> = manager
        .budget_report(&month)?
        .into_iter()
        .map(|row| ReportRow {
            category: row.category.label.clone(),
            budget: row.limit_minor.map(fmt_minor),
            net: fmt_minor(row.net_minor),
            remaining: row.remaining_minor.map(fmt_minor),
        })
        .collect();

    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.category.clone(),
                    r.budget.clone().unwrap_or_default(),
                    r.net.clone(),
                    r.remaining.clone().unwrap_or_default(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Category", "Budget", "Net", "Remaining"], rows)
        );
    }
    Ok(())
}
