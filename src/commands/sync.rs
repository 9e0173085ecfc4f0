// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::manager::BudgetManager;
use crate::sync::{CancelToken, HttpRemote, StaticSession, SyncConfig, SyncEngine};
use anyhow::Result;

pub fn handle(manager: &BudgetManager, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("run", sub)) => run(manager, sub)?,
        Some(("status", _)) => status(manager),
        _ => {}
    }
    Ok(())
}

fn run(manager: &BudgetManager, sub: &clap::ArgMatches) -> Result<()> {
    let url = sub.get_one::<String>("url").unwrap();
    let token = sub.get_one::<String>("token").unwrap();
    let batch_size = *sub.get_one::<usize>("batch-size").unwrap();
    let watch = sub.get_flag("watch");

    let remote = HttpRemote::new(url.clone(), Box::new(StaticSession::new(token.clone())))?;
    let config = SyncConfig {
        batch_size,
        ..SyncConfig::default()
    };
    let mut engine = SyncEngine::new(manager.handle(), remote, config);
    let cancel = CancelToken::new();

    if watch {
        println!("Syncing against {} (ctrl-c to stop)", url);
        engine.run_until_cancelled(&cancel)?;
    } else {
        let summary = engine.run_pass(&cancel)?;
        match &summary.transport_error {
            Some(msg) => println!(
                "Sync pass incomplete (transport: {}); {} changes still pending",
                msg,
                manager.pending_changes()
            ),
            None => println!(
                "Sync pass done: pulled {}, acknowledged {}, {} pending{}",
                summary.pulled,
                summary.acknowledged,
                manager.pending_changes(),
                if summary.rebuilt {
                    " (aggregates rebuilt)"
                } else {
                    ""
                }
            ),
        }
    }
    Ok(())
}

fn status(manager: &BudgetManager) {
    println!(
        "pending changes: {}  cursor: {}",
        manager.pending_changes(),
        manager.cursor().unwrap_or_else(|| "<none>".to_string())
    );
}
