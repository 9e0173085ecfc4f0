// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use pocketledger::{cli, commands, db, manager::BudgetManager};

fn main() -> Result<()> {
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let conn = db::open_or_init()?;
    let manager = BudgetManager::open(conn)?;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("category", sub)) => commands::categories::handle(&manager, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&manager, sub)?,
        Some(("budget", sub)) => commands::budgets::handle(&manager, sub)?,
        Some(("sync", sub)) => commands::sync::handle(&manager, sub)?,
        Some(("export", sub)) => commands::exporter::handle(&manager, sub)?,
        Some(("doctor", _)) => commands::doctor::handle(&manager)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
