//! `br daemons` command implementation: inspect and clear the advisory
//! daemon lock, read-only except for `killall`.

use crate::cli::DaemonsCommands;
use crate::config;
use crate::error::Result;
use crate::sync::lock;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct DaemonEntry {
    beads_dir: String,
    pid: u32,
    started_at: String,
    alive: bool,
}

fn lock_path() -> Result<(std::path::PathBuf, std::path::PathBuf)> {
    let beads_dir = config::discover_beads_dir(None)?;
    let lock_path = beads_dir.join("daemon.lock");
    Ok((beads_dir, lock_path))
}

fn read_entry(beads_dir: &std::path::Path, lock_path: &std::path::Path) -> Result<Option<DaemonEntry>> {
    let Some(info) = lock::inspect(lock_path)? else {
        return Ok(None);
    };
    Ok(Some(DaemonEntry {
        beads_dir: beads_dir.display().to_string(),
        pid: info.pid,
        started_at: info.started_at.to_rfc3339(),
        alive: lock::is_alive(info.pid),
    }))
}

/// Execute `br daemons {list, health, killall}`.
///
/// # Errors
///
/// Returns an error if no `.beads` directory can be discovered or the lock
/// file can't be read.
pub fn execute(command: &DaemonsCommands, json: bool, _cli: &config::CliOverrides) -> Result<()> {
    let (beads_dir, lock_path) = lock_path()?;

    match command {
        DaemonsCommands::List => {
            let entry = read_entry(&beads_dir, &lock_path)?;
            let entries: Vec<DaemonEntry> = entry.into_iter().collect();
            if json {
                println!("{}", serde_json::to_string(&entries)?);
            } else if entries.is_empty() {
                println!("no daemon running for {}", beads_dir.display());
            } else {
                for entry in &entries {
                    println!(
                        "pid {} started {} alive={} ({})",
                        entry.pid, entry.started_at, entry.alive, entry.beads_dir
                    );
                }
            }
            Ok(())
        }
        DaemonsCommands::Health => {
            let entry = read_entry(&beads_dir, &lock_path)?;
            let healthy = entry.as_ref().is_some_and(|e| e.alive);
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "healthy": healthy, "daemon": entry })
                );
            } else if healthy {
                println!("daemon healthy");
            } else {
                println!("no live daemon for {}", beads_dir.display());
            }
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        DaemonsCommands::Killall => {
            let entry = read_entry(&beads_dir, &lock_path)?;
            let removed = lock::force_remove(&lock_path)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "removed": removed, "daemon": entry })
                );
            } else if removed {
                println!("removed daemon lock at {}", lock_path.display());
            } else {
                println!("no daemon lock present at {}", lock_path.display());
            }
            Ok(())
        }
    }
}
