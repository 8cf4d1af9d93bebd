//! One supervisor process per database directory: owns the export and
//! import debouncers, serializes exporter/importer/git-bridge work through
//! a single-consumer action queue, and drives an optional heartbeat for
//! auto-pull/auto-push.
//!
//! Everything here runs on plain OS threads (`std::thread`, `std::sync`);
//! no async runtime is introduced, matching the rest of this crate.

use crate::error::Result;
use crate::storage::{ChangeEvent, ChangeSubscription, SqliteStorage};
use crate::sync::debounce::Debouncer;
use crate::sync::git::GitBridge;
use crate::sync::lock::DaemonLock;
use crate::sync::watcher::{self, JournalWatcher};
use crate::sync::{ImportConfig, OrphanMode};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Everything the supervisor needs to know about where it's running and
/// how eagerly it should act.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub beads_dir: PathBuf,
    pub repo_root: PathBuf,
    pub journal_path: PathBuf,
    pub export_debounce: Duration,
    pub import_debounce: Duration,
    pub heartbeat_interval: Duration,
    pub poll_interval_ms: u64,
    pub git_auto_pull: bool,
    pub git_auto_push: bool,
}

impl DaemonConfig {
    /// Defaults matching spec: 30s export debounce, 500ms import debounce,
    /// 5s heartbeat, auto-pull/push off until the caller opts in.
    #[must_use]
    pub fn new(beads_dir: PathBuf, repo_root: PathBuf) -> Self {
        let journal_path = beads_dir.join("issues.jsonl");
        Self {
            beads_dir,
            repo_root,
            journal_path,
            export_debounce: Duration::from_secs(30),
            import_debounce: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(5),
            poll_interval_ms: watcher::DEFAULT_POLL_INTERVAL_MS,
            git_auto_pull: false,
            git_auto_push: false,
        }
    }

    fn lock_path(&self) -> PathBuf {
        self.beads_dir.join("daemon.lock")
    }
}

enum Action {
    Export,
    Import,
    GitPull,
    GitPush,
    Stop,
}

/// A running supervisor. Dropping this without calling [`Self::shutdown`]
/// still releases the lock (via `DaemonLock`'s own `Drop`), but skips the
/// final flush -- prefer `shutdown()` for a clean stop.
pub struct DaemonHandle {
    export_debouncer: Debouncer,
    import_debouncer: Debouncer,
    actions: mpsc::Sender<Action>,
    consumer: Option<thread::JoinHandle<()>>,
    heartbeat_stop: Arc<AtomicBool>,
    heartbeat: Option<thread::JoinHandle<()>>,
    _watcher: JournalWatcher,
    _subscription: ChangeSubscription,
    _lock: DaemonLock,
}

impl DaemonHandle {
    /// Flush both debouncers synchronously, drain the action queue, stop
    /// the watcher and heartbeat, and release the lock.
    pub fn shutdown(mut self) {
        self.export_debouncer.shutdown();
        self.import_debouncer.shutdown();
        self.export_debouncer.fire_now();
        self.import_debouncer.fire_now();

        self.heartbeat_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.heartbeat.take() {
            let _ = handle.join();
        }

        let _ = self.actions.send(Action::Stop);
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
        // `_lock` and `_watcher` release on drop at the end of this scope.
    }
}

/// Acquire the daemon lock and start the supervisor against an already-open
/// `storage`. `storage` is shared with the consumer thread for import/export
/// work; callers should not mutate it directly while the daemon runs except
/// through the same mutex.
///
/// # Errors
///
/// Returns `BeadsError::LockHeld` if another live daemon holds the lock.
pub fn spawn(config: DaemonConfig, storage: Arc<Mutex<SqliteStorage>>) -> Result<DaemonHandle> {
    let lock = DaemonLock::acquire(&config.lock_path())?;
    tracing::info!(pid = lock.info().pid, "daemon lock acquired");

    let (tx, rx) = mpsc::channel::<Action>();

    let consumer = {
        let storage = Arc::clone(&storage);
        let config = config.clone();
        let tx_for_git_retry = tx.clone();
        thread::spawn(move || run_consumer(&config, &storage, rx, &tx_for_git_retry))
    };

    let export_tx = tx.clone();
    let export_debouncer = Debouncer::new(config.export_debounce, move || {
        let _ = export_tx.send(Action::Export);
    });

    let import_tx = tx.clone();
    let import_debouncer = Debouncer::new(config.import_debounce, move || {
        let _ = import_tx.send(Action::Import);
    });

    let subscription = {
        let export_debouncer = export_debouncer.clone();
        let storage = storage.lock().unwrap_or_else(|e| e.into_inner());
        storage.subscribe(move |_event: &ChangeEvent| {
            export_debouncer.trigger();
        })
    };

    let watcher = JournalWatcher::start(
        &config.journal_path,
        import_debouncer.clone(),
        config.poll_interval_ms,
    );

    let heartbeat_stop = Arc::new(AtomicBool::new(false));
    let heartbeat = {
        let stop = Arc::clone(&heartbeat_stop);
        let interval = config.heartbeat_interval;
        let auto_pull = config.git_auto_pull;
        let auto_push = config.git_auto_push;
        let tx = tx.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                if auto_pull {
                    let _ = tx.send(Action::GitPull);
                }
                if auto_push {
                    let _ = tx.send(Action::GitPush);
                }
            }
        })
    };

    Ok(DaemonHandle {
        export_debouncer,
        import_debouncer,
        actions: tx,
        consumer: Some(consumer),
        heartbeat_stop,
        heartbeat: Some(heartbeat),
        _watcher: watcher,
        _subscription: subscription,
        _lock: lock,
    })
}

fn run_consumer(
    config: &DaemonConfig,
    storage: &Arc<Mutex<SqliteStorage>>,
    rx: mpsc::Receiver<Action>,
    self_tx: &mpsc::Sender<Action>,
) {
    let bridge = GitBridge::new(&config.repo_root);

    for action in rx {
        match action {
            Action::Stop => break,
            Action::Export => {
                if let Ok(mut storage) = storage.lock() {
                    match crate::sync::auto_flush(&mut storage, &config.beads_dir) {
                        Ok(result) if result.flushed => {
                            tracing::debug!(
                                exported = result.exported_count,
                                "daemon export flush completed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(?e, "daemon export flush failed"),
                    }
                }
            }
            Action::Import => {
                if let Ok(mut storage) = storage.lock() {
                    let import_config = ImportConfig {
                        skip_prefix_validation: false,
                        rename_on_import: false,
                        clear_duplicate_external_refs: false,
                        orphan_mode: OrphanMode::Skip,
                        force_upsert: false,
                        beads_dir: Some(config.beads_dir.clone()),
                        allow_external_jsonl: false,
                        show_progress: false,
                    };
                    let prefix = storage.get_config("issue_prefix").ok().flatten();
                    match crate::sync::import_from_jsonl(
                        &mut storage,
                        &config.journal_path,
                        &import_config,
                        prefix.as_deref(),
                    ) {
                        Ok(result) => {
                            tracing::debug!(
                                imported = result.imported_count,
                                "daemon import completed"
                            );
                        }
                        Err(e) => tracing::warn!(?e, "daemon import failed"),
                    }
                }
            }
            Action::GitPull => match bridge.pull(&config.journal_path) {
                Ok(crate::sync::git::PullOutcome::ResolvedByTakingRemote { .. }) => {
                    let _ = self_tx.send(Action::Import);
                }
                Ok(crate::sync::git::PullOutcome::Clean) => {}
                Err(e) => tracing::warn!(?e, "daemon auto-pull failed"),
            },
            Action::GitPush => {
                if let Ok(mut storage) = storage.lock() {
                    if let Err(e) = crate::sync::auto_flush(&mut storage, &config.beads_dir) {
                        tracing::warn!(?e, "pre-push export failed");
                    }
                }
                if let Err(e) = bridge.commit(&[config.journal_path.as_path()], "sync: auto-flush")
                {
                    tracing::warn!(?e, "daemon auto-commit failed");
                }
                if let Err(e) = bridge.push(&config.journal_path) {
                    tracing::warn!(?e, "daemon auto-push failed");
                }
            }
        }
    }
}
