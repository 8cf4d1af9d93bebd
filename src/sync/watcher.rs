//! Watches the journal file's directory and triggers the import debouncer
//! when something else (a `git pull`, a sibling process) changes it.
//!
//! Prefers `notify`'s recommended platform watcher; if construction fails
//! (no inotify instances left, sandboxed filesystem, etc.) falls back to a
//! polling thread comparing mtime and size, and reports the degradation
//! once via `tracing::warn!` rather than treating it as fatal.

use crate::sync::debounce::Debouncer;
use notify::{Event, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Default interval between polls when the native watcher isn't available.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// A running watch on a single journal file.
///
/// Dropping this stops the watch: the native watcher is dropped, and the
/// polling thread (if any) checks a shutdown flag each cycle and exits.
pub enum JournalWatcher {
    Native {
        _watcher: notify::RecommendedWatcher,
    },
    Polling {
        shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    },
}

impl JournalWatcher {
    /// Start watching `journal_path`'s parent directory, calling
    /// `on_changed.trigger()` on every filesystem event that could mean the
    /// journal moved (the exporter renames a temp file onto it).
    pub fn start(journal_path: &Path, on_changed: Debouncer, poll_interval_ms: u64) -> Self {
        let parent = journal_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let target = journal_path.to_path_buf();

        match build_native_watcher(&parent, &target, on_changed.clone()) {
            Ok(watcher) => Self::Native { _watcher: watcher },
            Err(reason) => {
                tracing::warn!(%reason, "file watcher unavailable, falling back to polling");
                Self::start_polling(target, on_changed, poll_interval_ms)
            }
        }
    }

    fn start_polling(target: PathBuf, on_changed: Debouncer, poll_interval_ms: u64) -> Self {
        let shutdown = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let shutdown_thread = std::sync::Arc::clone(&shutdown);
        let interval = Duration::from_millis(poll_interval_ms.max(100));

        let handle = thread::spawn(move || {
            let mut last_seen = snapshot(&target);
            while !shutdown_thread.load(std::sync::atomic::Ordering::Relaxed) {
                thread::sleep(interval);
                let current = snapshot(&target);
                if current != last_seen {
                    last_seen = current;
                    on_changed.trigger();
                }
            }
        });

        Self::Polling {
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for JournalWatcher {
    fn drop(&mut self) {
        if let Self::Polling { shutdown, handle } = self {
            shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

type Snapshot = Option<(u64, std::time::SystemTime)>;

fn snapshot(path: &Path) -> Snapshot {
    let meta = fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    Some((meta.len(), modified))
}

fn build_native_watcher(
    parent: &Path,
    target: &Path,
    on_changed: Debouncer,
) -> Result<notify::RecommendedWatcher, String> {
    let target = target.to_path_buf();
    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })
    .map_err(|e| e.to_string())?;

    watcher
        .watch(parent, RecursiveMode::NonRecursive)
        .map_err(|e| e.to_string())?;

    thread::spawn(move || {
        for res in rx {
            match res {
                Ok(event) => {
                    if event.paths.iter().any(|p| p == &target) {
                        on_changed.trigger();
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "file watcher event error");
                }
            }
        }
    });

    Ok(watcher)
}
