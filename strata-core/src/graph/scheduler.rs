//! Notification Scheduler
//!
//! The scheduler decides the order in which queued listener calls run.
//! Listeners registered at a lower level (closer to the sources of the
//! graph) should run before listeners at a higher level that were queued in
//! the same cascade.
//!
//! # Algorithm
//!
//! There is one flat queue per runtime:
//!
//! 1. `dispatch` appends one entry per listener of the notifying store.
//! 2. If a drain is already running (a listener notified another store), the
//!    new entries are simply left for that drain to pick up.
//! 3. Otherwise this call becomes the drain. The epoch is bumped, then
//!    entries are popped from the front. Before running an entry we scan the
//!    rest of the queue: if any later entry has a strictly lower level, the
//!    current entry is pushed to the back instead of running.
//!
//! This is a best-effort ordering, not a topological sort. Levels are only an
//! approximation of graph depth, and an entry is only ever deferred behind
//! entries that are already queued.
//!
//! # Threads
//!
//! A drain belongs to the thread that started it. Only a re-entrant dispatch
//! on that same thread joins it; a dispatch from any other thread blocks
//! until the drain is over and then drains its own batch. Listeners therefore
//! always run on the thread whose write queued them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::trace;

use super::Level;

/// A queued listener call.
pub(crate) struct Pending {
    level: Level,
    deliver: Box<dyn FnOnce() + Send>,
}

impl Pending {
    pub(crate) fn new<F>(level: Level, deliver: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            level,
            deliver: Box::new(deliver),
        }
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Pending>,
    draining: bool,
}

/// The notification queue and epoch counter of one runtime.
#[derive(Default)]
pub struct NotifyScheduler {
    /// Held by the draining thread for the whole drain.
    turn: ReentrantMutex<()>,
    state: Mutex<QueueState>,
    epoch: AtomicU64,
}

impl NotifyScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of top-level drains started so far.
    ///
    /// Computed stores compare against this to tell whether a recomputation
    /// already happened in the current cascade.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Whether a drain is currently running.
    pub fn is_draining(&self) -> bool {
        self.state.lock().draining
    }

    /// Number of entries waiting in the queue.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Queue a batch of listener calls and drain if no drain is active.
    pub(crate) fn dispatch(&self, batch: Vec<Pending>) {
        let _turn = self.turn.lock();
        {
            let mut state = self.state.lock();
            state.queue.extend(batch);
            if state.draining {
                return;
            }
            state.draining = true;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = DrainGuard { scheduler: self };
        let mut delivered = 0usize;
        let mut deferred = 0usize;

        loop {
            let next = {
                let mut state = self.state.lock();
                let Some(entry) = state.queue.pop_front() else {
                    state.draining = false;
                    break;
                };
                if state.queue.iter().any(|later| later.level < entry.level) {
                    state.queue.push_back(entry);
                    deferred += 1;
                    continue;
                }
                entry
            };
            (next.deliver)();
            delivered += 1;
        }

        trace!(epoch, delivered, deferred, "notification queue drained");
    }
}

/// Resets the queue if a listener panics mid-drain, so later notifications
/// are not stuck behind a drain that will never finish.
struct DrainGuard<'a> {
    scheduler: &'a NotifyScheduler,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut state = self.scheduler.state.lock();
        state.queue.clear();
        state.draining = false;
    }
}

impl std::fmt::Debug for NotifyScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyScheduler")
            .field("epoch", &self.epoch())
            .field("queued", &self.queued())
            .field("draining", &self.is_draining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;
    use std::time::Duration;

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<&'static str>>>, level: Level, name: &'static str) -> Pending {
        let log = log.clone();
        Pending::new(level, move || log.lock().push(name))
    }

    #[test]
    fn runs_in_queue_order_at_equal_levels() {
        let scheduler = NotifyScheduler::new();
        let log = recorder();

        scheduler.dispatch(vec![push(&log, 0, "a"), push(&log, 0, "b"), push(&log, 0, "c")]);

        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(scheduler.queued(), 0);
        assert!(!scheduler.is_draining());
    }

    #[test]
    fn defers_entries_behind_lower_levels() {
        let scheduler = NotifyScheduler::new();
        let log = recorder();

        scheduler.dispatch(vec![push(&log, 2, "high"), push(&log, 1, "mid"), push(&log, 0, "low")]);

        assert_eq!(*log.lock(), vec!["low", "mid", "high"]);
    }

    #[test]
    fn reentrant_dispatch_joins_the_active_drain() {
        let scheduler = Arc::new(NotifyScheduler::new());
        let log = recorder();

        let inner_scheduler = scheduler.clone();
        let inner_log = log.clone();
        let outer = Pending::new(0, move || {
            inner_log.lock().push("outer");
            let nested = push(&inner_log, 1, "nested");
            inner_scheduler.dispatch(vec![nested]);
            // The nested entry waits for the active drain.
            inner_log.lock().push("outer-done");
        });

        scheduler.dispatch(vec![outer, push(&log, 0, "sibling")]);

        assert_eq!(*log.lock(), vec!["outer", "outer-done", "sibling", "nested"]);
        assert_eq!(scheduler.epoch(), 1);
    }

    #[test]
    fn dispatch_from_another_thread_waits_and_delivers_on_the_caller() {
        let scheduler = Arc::new(NotifyScheduler::new());
        let log = recorder();
        let (started, wait_started) = std::sync::mpsc::channel();

        let worker = {
            let scheduler = scheduler.clone();
            let log = log.clone();
            std::thread::spawn(move || {
                scheduler.dispatch(vec![Pending::new(0, move || {
                    started.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(100));
                    log.lock().push("slow");
                })]);
            })
        };
        wait_started.recv().unwrap();

        let caller = std::thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let sink = ran_on.clone();
        let fast_log = log.clone();
        scheduler.dispatch(vec![Pending::new(0, move || {
            *sink.lock() = Some(std::thread::current().id());
            fast_log.lock().push("fast");
        })]);

        assert_eq!(*log.lock(), vec!["slow", "fast"]);
        assert_eq!(*ran_on.lock(), Some(caller));
        assert_eq!(scheduler.epoch(), 2);
        worker.join().unwrap();
    }

    #[test]
    fn epoch_advances_once_per_top_level_dispatch() {
        let scheduler = NotifyScheduler::new();
        assert_eq!(scheduler.epoch(), 0);

        scheduler.dispatch(Vec::new());
        scheduler.dispatch(vec![Pending::new(0, || {})]);

        assert_eq!(scheduler.epoch(), 2);
    }

    #[test]
    fn panicking_listener_resets_the_queue() {
        let scheduler = NotifyScheduler::new();
        let log = recorder();

        let result = catch_unwind(AssertUnwindSafe(|| {
            scheduler.dispatch(vec![
                Pending::new(0, || panic!("listener failed")),
                push(&log, 0, "skipped"),
            ]);
        }));

        assert!(result.is_err());
        assert!(!scheduler.is_draining());
        assert_eq!(scheduler.queued(), 0);

        scheduler.dispatch(vec![push(&log, 0, "after")]);
        assert_eq!(*log.lock(), vec!["after"]);
    }
}
