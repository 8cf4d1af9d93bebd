//! Installs git hooks that call back into `br` so the sync daemon hears
//! about commits, merges, pushes, and branch switches it didn't cause
//! itself.
//!
//! Every installed hook carries a managed-header comment stamped with
//! [`HOOK_VERSION`]. Reinstalling only overwrites scripts that still carry
//! a managed header (any version); a script a user wrote by hand, or
//! appended to without preserving the header, is left alone and reported
//! as a conflict rather than clobbered.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Bumped whenever the generated hook body changes in a way that matters
/// for idempotent reinstall (not on every cosmetic edit).
pub const HOOK_VERSION: u32 = 1;

const MANAGED_HEADER_PREFIX: &str = "# managed-by: beads sync hooks v";

/// One of the four lifecycle points the sync daemon cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreCommit,
    PostMerge,
    PrePush,
    PostCheckout,
}

impl HookKind {
    const ALL: [Self; 4] = [
        Self::PreCommit,
        Self::PostMerge,
        Self::PrePush,
        Self::PostCheckout,
    ];

    const fn file_name(self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::PostMerge => "post-merge",
            Self::PrePush => "pre-push",
            Self::PostCheckout => "post-checkout",
        }
    }

    const fn sync_action(self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::PostMerge => "post-merge",
            Self::PrePush => "pre-push",
            Self::PostCheckout => "post-checkout",
        }
    }
}

/// Outcome of installing one hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    Reinstalled,
    SkippedUnmanagedScriptPresent { path: PathBuf },
}

/// Install (or reinstall) all four hooks into `git_dir/hooks/`.
///
/// # Errors
///
/// Returns an error if the hooks directory can't be created or a hook
/// file can't be written.
pub fn install_all(git_dir: &Path) -> Result<Vec<(HookKind, InstallOutcome)>> {
    let hooks_dir = git_dir.join("hooks");
    fs::create_dir_all(&hooks_dir)?;

    let mut results = Vec::with_capacity(HookKind::ALL.len());
    for kind in HookKind::ALL {
        let outcome = install_one(&hooks_dir, kind)?;
        results.push((kind, outcome));
    }
    Ok(results)
}

fn install_one(hooks_dir: &Path, kind: HookKind) -> Result<InstallOutcome> {
    let path = hooks_dir.join(kind.file_name());
    let script = render_script(kind);

    if path.exists() {
        let existing = fs::read_to_string(&path).unwrap_or_default();
        if !is_managed(&existing) {
            tracing::warn!(
                path = %path.display(),
                "leaving existing hook in place; it has no beads-managed header"
            );
            return Ok(InstallOutcome::SkippedUnmanagedScriptPresent { path });
        }
        fs::write(&path, script)?;
        set_executable(&path)?;
        return Ok(InstallOutcome::Reinstalled);
    }

    fs::write(&path, script)?;
    set_executable(&path)?;
    Ok(InstallOutcome::Installed)
}

fn is_managed(contents: &str) -> bool {
    contents
        .lines()
        .any(|line| line.starts_with(MANAGED_HEADER_PREFIX))
}

fn render_script(kind: HookKind) -> String {
    format!(
        "#!/bin/sh\n{MANAGED_HEADER_PREFIX}{HOOK_VERSION}\n# Regenerate with: br hooks install\nbr --sync-now {action} \"$@\"\n",
        action = kind.sync_action(),
    )
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
