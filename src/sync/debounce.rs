//! Debounce-and-coalesce trigger for the export/import daemons.
//!
//! `Trigger()` arms (or re-arms) a deadline; a single timer thread waits for
//! the deadline and fires the configured action once no further trigger has
//! landed in the meantime. Firing never overlaps: a trigger that arrives
//! while the action is running is remembered and causes an immediate
//! re-arm once the action returns, rather than being dropped or queued
//! twice.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

struct State {
    /// Bumped by every `trigger()`; a sleeping timer thread compares its
    /// captured generation against this to detect it's been superseded.
    generation: u64,
    /// Deadline the current generation should fire at, if armed.
    deadline: Option<Instant>,
    /// Whether the action is currently executing.
    firing: bool,
    /// Set when a trigger arrives while `firing` is true; consumed to
    /// immediately re-arm once the in-flight fire completes.
    pending_during_fire: bool,
    /// Set by `shutdown()`; timer threads exit without firing once seen.
    shut_down: bool,
}

/// A debounced, non-overlapping trigger.
///
/// Cloning an `Arc<Debouncer>` (or just cloning the handle, since it's
/// internally `Arc`-backed) is how multiple producers (file watcher thread,
/// `Store::subscribe` listener) share one debouncer.
pub struct Debouncer {
    state: Arc<Mutex<State>>,
    cond: Arc<Condvar>,
    delay: Duration,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl Clone for Debouncer {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            cond: Arc::clone(&self.cond),
            delay: self.delay,
            action: Arc::clone(&self.action),
        }
    }
}

impl Debouncer {
    /// Create a debouncer that waits `delay` after the last `trigger()`
    /// before running `action` on a dedicated worker thread.
    pub fn new(delay: Duration, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                generation: 0,
                deadline: None,
                firing: false,
                pending_during_fire: false,
                shut_down: false,
            })),
            cond: Arc::new(Condvar::new()),
            delay,
            action: Arc::new(action),
        }
    }

    /// Arm (or re-arm) the deadline `delay` from now and spawn a timer
    /// thread if one isn't already racing toward the same generation.
    pub fn trigger(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.shut_down {
            return;
        }
        state.generation += 1;
        let generation = state.generation;
        state.deadline = Some(Instant::now() + self.delay);

        if state.firing {
            state.pending_during_fire = true;
            return;
        }
        drop(state);
        self.spawn_timer(generation);
    }

    /// Clear any armed deadline. A fire already in progress is not
    /// interrupted; a trigger that arrived mid-fire is also cleared.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.deadline = None;
        state.pending_during_fire = false;
        state.generation += 1;
    }

    /// Run the action immediately, synchronously, as if the debounce
    /// window had just elapsed. Used by graceful shutdown to flush.
    pub fn fire_now(&self) {
        self.fire();
    }

    /// Stop accepting new triggers; any sleeping timer threads exit quietly.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.shut_down = true;
        state.deadline = None;
        self.cond.notify_all();
    }

    fn spawn_timer(&self, generation: u64) {
        let debouncer = self.clone();
        thread::spawn(move || debouncer.run_timer(generation));
    }

    fn run_timer(&self, generation: u64) {
        loop {
            let deadline = {
                let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if state.shut_down || state.generation != generation {
                    return;
                }
                match state.deadline {
                    Some(d) => d,
                    None => return,
                }
            };

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(deadline - now);
        }

        let should_fire = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.shut_down || state.generation != generation {
                false
            } else {
                state.deadline = None;
                state.firing = true;
                true
            }
        };

        if should_fire {
            self.fire();
        }
    }

    /// Run the action, then check whether a trigger landed mid-fire; if so
    /// re-arm immediately instead of waiting for a fresh external trigger.
    fn fire(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.firing = true;
        }

        (self.action)();

        let rearm_generation = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.firing = false;
            if state.pending_during_fire && !state.shut_down {
                state.pending_during_fire = false;
                state.generation += 1;
                state.deadline = Some(Instant::now() + self.delay);
                Some(state.generation)
            } else {
                None
            }
        };

        if let Some(generation) = rearm_generation {
            self.spawn_timer(generation);
        }
        self.cond.notify_all();
    }

    /// Block until no fire is in progress and no deadline is armed.
    ///
    /// Used by tests and by the daemon's graceful shutdown path.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            {
                let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if !state.firing && state.deadline.is_none() {
                    return true;
                }
            }
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn single_trigger_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(20), move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        debouncer.trigger();
        assert!(debouncer.wait_idle(Duration::from_secs(1)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rapid_triggers_coalesce_into_one_fire() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(40), move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..20 {
            debouncer.trigger();
            thread::sleep(Duration::from_millis(2));
        }
        assert!(debouncer.wait_idle(Duration::from_secs(1)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_during_fire_causes_a_second_fire() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(10), move || {
            count2.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
        });

        debouncer.trigger();
        thread::sleep(Duration::from_millis(15));
        debouncer.trigger(); // lands while firing
        assert!(debouncer.wait_idle(Duration::from_secs(2)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_prevents_fire() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(30), move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        debouncer.trigger();
        debouncer.cancel();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_stops_future_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(10), move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.shutdown();
        debouncer.trigger();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
