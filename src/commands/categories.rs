// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::manager::BudgetManager;
use crate::utils::{fmt_minor, maybe_print_json, pretty_table};
use anyhow::Result;

pub fn handle(manager: &BudgetManager, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let label = sub.get_one::<String>("label").unwrap();
            let category = manager.add_category(label)?;
            println!("Added category '{}' ({})", category.label, category.id);
        }
        Some(("list", sub)) => {
            let json_flag = sub.get_flag("json");
            let jsonl_flag = sub.get_flag("jsonl");
            let categories = manager.categories();
            if !maybe_print_json(json_flag, jsonl_flag, &categories)? {
                let rows: Vec<Vec<String>> = categories
                    .iter()
                    .map(|c| {
                        let (limit, period) = match &c.budget_limit {
                            Some(b) => (fmt_minor(b.amount_minor), b.period.clone()),
                            None => (String::new(), String::new()),
                        };
                        vec![
                            c.id.to_string(),
                            c.label.clone(),
                            limit,
                            period,
                            c.sync_status.as_str().to_string(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["Id", "Label", "Budget", "Period", "Sync"], rows)
                );
            }
        }
        _ => {}
    }
    Ok(())
}
