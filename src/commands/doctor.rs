// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::manager::BudgetManager;
use crate::utils::fmt_minor;
use anyhow::Result;

pub fn handle(manager: &BudgetManager) -> Result<()> {
    let rebuilt = manager.verify_aggregates();
    if rebuilt {
        println!("doctor: aggregate divergence detected; index rebuilt from ledger");
    } else {
        println!("doctor: aggregates consistent with ledger");
    }
    println!(
        "balance: {}  pending changes: {}",
        fmt_minor(manager.running_balance()),
        manager.pending_changes()
    );
    Ok(())
}
