//! Implementation of the `bakery list` command.

use bakery::config::LockConfig;
use bakery::error::{BakeryError, Result};
use bakery::locks;
use crate::cli::ListArgs;

pub(super) fn cmd_list(config: LockConfig, args: ListArgs) -> Result<()> {
    let manager = super::lock_manager(config)?;
    let report = locks::list_members(&manager, &args.path)?;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| BakeryError::User(format!("failed to serialize lock report: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    if !report.exists || report.members.is_empty() {
        println!("No members in {}", report.lock_dir.display());
    } else {
        println!("Members of {} ({}):", report.lock_dir.display(), report.members.len());
        println!();
        for member in &report.members {
            println!("  {}", member.name);
            match &member.record {
                Some(record) => {
                    println!("    Type:       {}", record.kind);
                    println!("    Ticket:     {}", record.lamport_number);
                    println!("    Machine:    {}", record.machine_id);
                    println!("    Execution:  {}", record.execution_id);
                    if !record.payload.is_empty() {
                        println!("    Payload:    {}", record.payload);
                    }
                }
                None => {
                    println!(
                        "    Status:     CORRUPT ({})",
                        member.problem.as_deref().unwrap_or("unreadable")
                    );
                }
            }
            if let Some(modified) = member.modified {
                println!("    Written:    {}", modified.format("%Y-%m-%d %H:%M:%S UTC"));
                println!("    Age:        {}", member.age_string());
            }
            if member.stale {
                println!("    Status:     STALE (owner process is gone)");
            }
            println!();
        }
    }

    if !report.pending_entries.is_empty() {
        println!("Admissions in progress: {}", report.pending_entries.join(", "));
    }
    if !report.debris.is_empty() {
        println!("Foreign entries: {}", report.debris.join(", "));
    }

    // Summary
    let stale_count = report
        .members
        .iter()
        .filter(|m| m.stale || m.record.is_none())
        .count();
    if stale_count > 0 {
        println!(
            "Note: {} member(s) are stale or corrupt. Use `bakery clean {}` to remove them.",
            stale_count,
            args.path.display()
        );
    }

    Ok(())
}
