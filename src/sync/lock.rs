//! Advisory lock for the sync daemon, backed by `.beads/daemon.lock`.
//!
//! The lock file holds the owning pid and its start time (RFC3339). A
//! daemon starting up that finds a lock file belonging to a dead pid
//! reclaims it; when two daemons race to reclaim the same dead lock, the
//! tie-break is whichever one's rename of a freshly-written sentinel onto
//! the lock path lands first -- `fs::rename` is atomic on the platforms
//! this targets, so exactly one daemon observes its own content back when
//! it re-reads the path afterward.

use crate::error::{BeadsError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

/// Contents of a `daemon.lock` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockInfo {
    fn encode(&self) -> String {
        format!("{}\n{}\n", self.pid, self.started_at.to_rfc3339())
    }

    fn decode(contents: &str) -> Option<Self> {
        let mut lines = contents.lines();
        let pid = lines.next()?.trim().parse().ok()?;
        let started_at = DateTime::parse_from_rfc3339(lines.next()?.trim())
            .ok()?
            .with_timezone(&Utc);
        Some(Self { pid, started_at })
    }
}

/// A held daemon lock. Releasing happens on drop or via [`Self::release`].
pub struct DaemonLock {
    path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl DaemonLock {
    /// Try to acquire the lock at `path`.
    ///
    /// # Errors
    ///
    /// Returns `BeadsError::LockHeld` if a live process holds the lock.
    /// Any I/O failure while reading or writing the lock file is returned
    /// as-is.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(existing) = read_lock(path)? {
            if process_is_alive(existing.pid) {
                return Err(BeadsError::LockHeld {
                    pid: existing.pid,
                    path: path.to_path_buf(),
                });
            }
            tracing::warn!(
                stale_pid = existing.pid,
                "daemon.lock belongs to a dead process; reclaiming"
            );
        }

        let info = LockInfo {
            pid: process::id(),
            started_at: Utc::now(),
        };
        claim(path, &info)?;

        // Re-read after the atomic rename: if another daemon raced us and
        // won, we'll see its pid instead of ours.
        let winner = read_lock(path)?.ok_or_else(|| {
            BeadsError::Internal("daemon.lock vanished immediately after claim".to_string())
        })?;
        if winner.pid != info.pid {
            return Err(BeadsError::LockHeld {
                pid: winner.pid,
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            info,
            released: false,
        })
    }

    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release the lock, removing the file if it still names this process.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Ok(Some(current)) = read_lock(&self.path) {
            if current.pid == self.info.pid {
                let _ = fs::remove_file(&self.path);
            }
        }
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Read back whatever lock info is on disk at `path`, without attempting to
/// acquire it. Used by read-only daemon-inspection commands.
///
/// # Errors
///
/// Returns an error if the file exists but can't be read.
pub fn inspect(path: &Path) -> Result<Option<LockInfo>> {
    read_lock(path)
}

/// Whether `pid` still names a live process, per the same probe
/// [`DaemonLock::acquire`] uses to decide whether to reclaim a stale lock.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    process_is_alive(pid)
}

/// Remove the lock file unconditionally, regardless of which pid owns it.
///
/// # Errors
///
/// Returns an error if the file exists but can't be removed.
pub fn force_remove(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_lock(path: &Path) -> Result<Option<LockInfo>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(LockInfo::decode(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a sentinel to a sibling temp file, then atomically rename it onto
/// `path`. This is the tie-break primitive: of two concurrent claimants,
/// exactly one's rename is the last to land.
fn claim(path: &Path, info: &LockInfo) -> Result<()> {
    let tmp_path = path.with_extension(format!("lock.tmp.{}", process::id()));
    fs::write(&tmp_path, info.encode())?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Probe whether `pid` is still a live process.
///
/// This crate forbids `unsafe` code, so liveness is checked by reading
/// `/proc/<pid>` on Linux rather than calling `kill(pid, 0)` directly.
/// Platforms without `/proc` fall back to assuming the pid is alive,
/// which is the conservative choice: it just means a truly stale lock
/// waits for an operator to clear it instead of being auto-reclaimed.
#[cfg(target_os = "linux")]
fn process_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_is_alive(_pid: u32) -> bool {
    true
}
