//! Task Tracking
//!
//! A runtime counts units of asynchronous work that stores kick off (async
//! actions, async combiners, anything wrapped in [`TaskTracker::task`]).
//! External code can await [`TaskTracker::all_tasks`] to learn when every
//! one of them has settled, which is mostly useful in tests and in
//! server-side rendering where output must wait for data.
//!
//! # Lifecycle
//!
//! 1. [`TaskTracker::start`] increments the counter and hands back a
//!    [`TaskGuard`].
//! 2. Ending the guard (explicitly or by dropping it) decrements the counter.
//! 3. When the counter reaches zero, every pending `all_tasks` waiter is
//!    released.
//!
//! [`TaskTracker::clean`] resets the counter. Guards started before the reset
//! become inert so they cannot drive the counter below zero later.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Default)]
struct TaskState {
    pending: usize,
    generation: u64,
    waiters: Vec<oneshot::Sender<()>>,
}

/// Counter of in-flight tasks for one runtime.
#[derive(Default)]
pub struct TaskTracker {
    state: Mutex<TaskState>,
}

impl TaskTracker {
    /// Create a tracker with no pending tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently in flight.
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }

    /// Register the start of a task.
    pub fn start(self: &Arc<Self>) -> TaskGuard {
        let generation = {
            let mut state = self.state.lock();
            state.pending += 1;
            state.generation
        };
        TaskGuard {
            tracker: Arc::clone(self),
            generation,
        }
    }

    /// Run a future as a tracked task.
    ///
    /// The task starts when this is called, not when the returned future is
    /// first polled, so spawning it and then awaiting `all_tasks` is safe.
    pub fn task<F>(self: &Arc<Self>, work: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let guard = self.start();
        async move {
            let output = work.await;
            guard.end();
            output
        }
    }

    /// Run a synchronous closure as a tracked task.
    pub fn task_sync<R>(self: &Arc<Self>, work: impl FnOnce() -> R) -> R {
        let guard = self.start();
        let output = work();
        guard.end();
        output
    }

    /// Resolves once no task is pending.
    ///
    /// The waiter is registered when this method is called, not when the
    /// future is first polled. With no pending tasks the future is ready
    /// immediately.
    pub fn all_tasks(&self) -> impl Future<Output = ()> + Send + 'static {
        let receiver = {
            let mut state = self.state.lock();
            if state.pending == 0 {
                None
            } else {
                let (sender, receiver) = oneshot::channel();
                state.waiters.push(sender);
                Some(receiver)
            }
        };

        async move {
            if let Some(receiver) = receiver {
                // A dropped sender means the tracker is gone, which also
                // means nothing is pending any more.
                let _ = receiver.await;
            }
        }
    }

    /// Forget every pending task and release all waiters.
    pub fn clean(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.pending = 0;
            state.generation += 1;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    fn finish(&self, generation: u64) {
        let waiters = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.pending = state.pending.saturating_sub(1);
            if state.pending > 0 {
                return;
            }
            std::mem::take(&mut state.waiters)
        };

        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "all tasks settled");
        }
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

impl std::fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TaskTracker")
            .field("pending", &state.pending)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

/// Marks one task as in flight until ended or dropped.
#[must_use = "dropping a TaskGuard ends the task immediately"]
pub struct TaskGuard {
    tracker: Arc<TaskTracker>,
    generation: u64,
}

impl TaskGuard {
    /// End the task now.
    pub fn end(self) {}
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.tracker.finish(self.generation);
    }
}

impl std::fmt::Debug for TaskGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGuard")
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn guards_count_pending_tasks() {
        let tracker = Arc::new(TaskTracker::new());

        let first = tracker.start();
        let second = tracker.start();
        assert_eq!(tracker.pending(), 2);

        first.end();
        assert_eq!(tracker.pending(), 1);

        drop(second);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn task_sync_ends_after_the_closure() {
        let tracker = Arc::new(TaskTracker::new());
        let inner = tracker.clone();

        let seen = tracker.task_sync(|| inner.pending());

        assert_eq!(seen, 1);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn all_tasks_is_ready_with_nothing_pending() {
        let tracker = Arc::new(TaskTracker::new());
        tracker.all_tasks().await;
    }

    #[tokio::test(start_paused = true)]
    async fn all_tasks_waits_for_async_work() {
        let tracker = Arc::new(TaskTracker::new());
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        tokio::spawn(tracker.task(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        }));
        assert_eq!(tracker.pending(), 1);

        tracker.all_tasks().await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn dropping_an_unpolled_task_ends_it() {
        let tracker = Arc::new(TaskTracker::new());

        let work = tracker.task(async { 1 });
        assert_eq!(tracker.pending(), 1);

        drop(work);
        assert_eq!(tracker.pending(), 0);
        tracker.all_tasks().await;
    }

    #[tokio::test]
    async fn clean_releases_waiters_and_disarms_old_guards() {
        let tracker = Arc::new(TaskTracker::new());
        let stale = tracker.start();
        let waiter = tracker.all_tasks();

        tracker.clean();
        waiter.await;
        assert_eq!(tracker.pending(), 0);

        let fresh = tracker.start();
        drop(stale);
        assert_eq!(tracker.pending(), 1);
        fresh.end();
        assert_eq!(tracker.pending(), 0);
    }
}
