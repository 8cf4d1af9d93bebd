//! Hook installer command implementation.

use crate::config;
use crate::error::{BeadsError, Result};
use crate::sync::hooks::{self, InstallOutcome};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum OutcomeKind {
    Installed,
    Reinstalled,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
struct HookReport {
    name: &'static str,
    outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

/// Execute `br hooks install`.
///
/// # Errors
///
/// Returns an error if no `.beads` directory can be discovered, or if the
/// hook scripts can't be written.
pub fn execute(json: bool, cli: &config::CliOverrides) -> Result<()> {
    let beads_dir = config::discover_beads_dir(None)?;
    let repo_root = beads_dir.parent().ok_or_else(|| {
        BeadsError::Config(".beads directory has no parent repository root".to_string())
    })?;
    let git_dir = repo_root.join(".git");
    if !git_dir.is_dir() {
        return Err(BeadsError::Config(format!(
            "no .git directory found at {}",
            git_dir.display()
        )));
    }
    let _ = cli;

    let results = hooks::install_all(&git_dir)?;
    let reports: Vec<HookReport> = results
        .iter()
        .map(|(kind, outcome)| {
            let name = match kind {
                hooks::HookKind::PreCommit => "pre-commit",
                hooks::HookKind::PostMerge => "post-merge",
                hooks::HookKind::PrePush => "pre-push",
                hooks::HookKind::PostCheckout => "post-checkout",
            };
            let (outcome_kind, path) = match outcome {
                InstallOutcome::Installed => (OutcomeKind::Installed, None),
                InstallOutcome::Reinstalled => (OutcomeKind::Reinstalled, None),
                InstallOutcome::SkippedUnmanagedScriptPresent { path } => {
                    (OutcomeKind::Skipped, Some(path.display().to_string()))
                }
            };
            HookReport {
                name,
                outcome: outcome_kind,
                path,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string(&reports)?);
        return Ok(());
    }

    println!("br hooks install");
    for report in &reports {
        match report.outcome {
            OutcomeKind::Installed => println!("  installed   {}", report.name),
            OutcomeKind::Reinstalled => println!("  reinstalled {}", report.name),
            OutcomeKind::Skipped => println!(
                "  skipped     {} (unmanaged script at {})",
                report.name,
                report.path.as_deref().unwrap_or("?")
            ),
        }
    }
    Ok(())
}
