//! Subprocess bridge to the `git` binary.
//!
//! This is the *only* place in `sync` permitted to shell out to git (see
//! `validation::SyncSafetyValidator::assert_git_invocations_confined_to_bridge`
//! and the static-analysis test that enforces it). Every invocation runs in
//! the repository root, carries a timeout enforced by polling `try_wait()`
//! on a sleep loop (no async runtime), and kills the child on expiry.

use crate::error::{BeadsError, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Default timeout for any single git invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin wrapper around a git working tree, rooted at `repo_root`.
#[derive(Debug, Clone)]
pub struct GitBridge {
    repo_root: PathBuf,
    timeout: Duration,
}

/// Outcome of a `pull()` that needed conflict handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Already up to date, or fast-forwarded / rebased cleanly.
    Clean,
    /// A rebase conflict touched only the journal file and was resolved by
    /// taking the remote version; the caller should re-import afterward.
    ResolvedByTakingRemote { journal_path: PathBuf },
}

impl GitBridge {
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the working tree has no staged or unstaged changes.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be invoked or times out.
    pub fn is_clean(&self) -> Result<bool> {
        let output = self.run(&["status", "--porcelain"])?;
        Ok(output.trim().is_empty())
    }

    /// Whether the repository has a configured `origin` remote.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be invoked or times out.
    pub fn has_remote(&self) -> Result<bool> {
        match self.run(&["remote", "get-url", "origin"]) {
            Ok(_) => Ok(true),
            Err(BeadsError::WithContext { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stage `paths` and commit with `message`, if there's anything to commit.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be invoked or times out.
    pub fn commit(&self, paths: &[&Path], message: &str) -> Result<()> {
        if self.is_clean()? {
            return Ok(());
        }
        let mut add_args: Vec<&str> = vec!["add"];
        let path_strs: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        add_args.extend(path_strs.iter().map(String::as_str));
        self.run(&add_args)?;
        self.run(&["commit", "-m", message])?;
        Ok(())
    }

    /// Pull with rebase, resolving a journal-only conflict by taking the
    /// remote side. Any other conflicted file is left staged for the user.
    ///
    /// # Errors
    ///
    /// Returns `BeadsError::ConflictNeedsHuman` if a conflict touches a
    /// non-journal file, `BeadsError::GitTimeout` on timeout, or any other
    /// git failure as `BeadsError::WithContext`.
    pub fn pull(&self, journal_path: &Path) -> Result<PullOutcome> {
        match self.run(&["pull", "--rebase"]) {
            Ok(_) => Ok(PullOutcome::Clean),
            Err(_) => self.resolve_rebase_conflict(journal_path),
        }
    }

    fn resolve_rebase_conflict(&self, journal_path: &Path) -> Result<PullOutcome> {
        let status = self.run(&["status", "--porcelain"])?;
        let conflicted: Vec<&str> = status
            .lines()
            .filter(|line| line.starts_with("UU") || line.starts_with("AA"))
            .filter_map(|line| line.get(3..))
            .collect();

        let journal_name = journal_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let non_journal: Vec<String> = conflicted
            .iter()
            .filter(|path| !path.ends_with(journal_name))
            .map(ToString::to_string)
            .collect();

        if !non_journal.is_empty() {
            return Err(BeadsError::ConflictNeedsHuman { files: non_journal });
        }

        if conflicted.is_empty() {
            // The rebase failed for a reason other than a merge conflict;
            // surface whatever git said rather than guessing at resolution.
            let _ = self.run(&["rebase", "--abort"]);
            return Err(BeadsError::WithContext {
                context: "git pull --rebase failed".to_string(),
                source: Box::new(std::io::Error::other(
                    "no conflicted files found; rebase aborted",
                )),
            });
        }

        self.run(&["checkout", "--theirs", journal_name])?;
        self.run(&["add", journal_name])?;
        self.run(&["rebase", "--continue"])?;

        Ok(PullOutcome::ResolvedByTakingRemote {
            journal_path: journal_path.to_path_buf(),
        })
    }

    /// Push the current branch, retrying once (after a pull) on rejection.
    ///
    /// # Errors
    ///
    /// Returns an error if the retried push also fails, or on timeout.
    pub fn push(&self, journal_path: &Path) -> Result<()> {
        match self.run(&["push"]) {
            Ok(_) => Ok(()),
            Err(_) => {
                self.pull(journal_path)?;
                self.run(&["push"])?;
                Ok(())
            }
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let operation = args.join(" ");
        let mut child = command.spawn().map_err(|e| BeadsError::WithContext {
            context: format!("spawning 'git {operation}'"),
            source: Box::new(e),
        })?;

        let output = self.wait_with_timeout(&mut child, &operation)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(BeadsError::WithContext {
                context: format!("git {operation}"),
                source: Box::new(std::io::Error::other(stderr)),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn wait_with_timeout(
        &self,
        child: &mut Child,
        operation: &str,
    ) -> Result<std::process::Output> {
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(BeadsError::Io)? {
                let mut stdout = Vec::new();
                let mut stderr = Vec::new();
                if let Some(mut out) = child.stdout.take() {
                    let _ = out.read_to_end(&mut stdout);
                }
                if let Some(mut err) = child.stderr.take() {
                    let _ = err.read_to_end(&mut stderr);
                }
                return Ok(std::process::Output {
                    status,
                    stdout,
                    stderr,
                });
            }

            if start.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BeadsError::GitTimeout {
                    operation: operation.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }

            std::thread::sleep(Duration::from_millis(20));
        }
    }
}
