//! Store Runtime
//!
//! The runtime is the shared context that every store created in it talks
//! to. It owns:
//!
//! - the notification scheduler (one queue, one epoch counter),
//! - the task tracker behind `start_task` / `all_tasks`,
//! - the [`RuntimeConfig`] (unmount grace period, async policy).
//!
//! # Scope
//!
//! A `Runtime` is a cheap clonable handle. Stores capture the runtime they
//! were created in and keep using it, even when moved to another thread.
//! [`Runtime::current`] returns a thread-local default, so code that never
//! creates a runtime explicitly still gets one queue per thread and tests
//! running in parallel do not share notification state.
//!
//! A cascade started by `set` runs to completion on the calling thread before
//! `set` returns. Async combiner results and unmount timers may write from
//! other threads; a `set` that finds such a cascade in progress waits for it
//! to finish and then delivers its own listeners itself.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{error, warn};

use crate::config::RuntimeConfig;
use crate::graph::{Level, NotifyScheduler};
use crate::lifecycle::Teardown;
use crate::task::{TaskGuard, TaskTracker};
use crate::template::MapTemplate;

use super::{Atom, Clean, MapStore, MapValue, StoreValue};

struct RuntimeInner {
    config: RuntimeConfig,
    scheduler: NotifyScheduler,
    tasks: Arc<TaskTracker>,
}

/// Handle to a store runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

thread_local! {
    static CURRENT: Runtime = Runtime::new();
}

impl Runtime {
    /// Create an isolated runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an isolated runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                scheduler: NotifyScheduler::new(),
                tasks: Arc::new(TaskTracker::new()),
            }),
        }
    }

    /// The default runtime of the calling thread.
    pub fn current() -> Self {
        CURRENT.with(Runtime::clone)
    }

    /// Whether two handles point at the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &NotifyScheduler {
        &self.inner.scheduler
    }

    /// Current notification epoch. See [`NotifyScheduler::epoch`].
    pub fn epoch(&self) -> u64 {
        self.inner.scheduler.epoch()
    }

    pub fn tasks(&self) -> &Arc<TaskTracker> {
        &self.inner.tasks
    }

    /// Create an atom at level 0.
    pub fn atom<T: StoreValue>(&self, value: T) -> Atom<T> {
        Atom::with_level(self, value, 0)
    }

    /// Create an atom at an explicit graph level.
    pub fn atom_with_level<T: StoreValue>(&self, value: T, level: Level) -> Atom<T> {
        Atom::with_level(self, value, level)
    }

    /// Create a map store.
    pub fn map<V>(&self, initial: MapValue<V>) -> MapStore<V>
    where
        V: StoreValue + PartialEq,
    {
        MapStore::from_atom(self.atom(initial))
    }

    /// Create a keyed template of map stores.
    ///
    /// `init` runs each time a built store mounts and may return a teardown
    /// that runs when it unmounts.
    pub fn map_template<V, A, F>(&self, init: F) -> MapTemplate<V, A>
    where
        V: StoreValue + PartialEq + From<String>,
        A: Send + Sync + 'static,
        F: Fn(&MapStore<V>, &str, &A) -> Option<Teardown> + Send + Sync + 'static,
    {
        MapTemplate::new(self, init)
    }

    /// Register the start of a task. The task ends when the guard is ended
    /// or dropped.
    pub fn start_task(&self) -> TaskGuard {
        self.inner.tasks.start()
    }

    /// Run a future as a tracked task.
    ///
    /// The task is counted as soon as this is called, so `all_tasks` waits
    /// for it even before the returned future is first polled.
    pub fn task<F>(&self, work: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        self.inner.tasks.task(work)
    }

    /// Run a closure as a tracked task.
    pub fn task_sync<R>(&self, work: impl FnOnce() -> R) -> R {
        self.inner.tasks.task_sync(work)
    }

    /// Resolves once every tracked task has finished.
    pub fn all_tasks(&self) -> impl Future<Output = ()> + Send + 'static {
        self.inner.tasks.all_tasks()
    }

    /// Reset the task counter.
    pub fn clean_tasks(&self) {
        self.inner.tasks.clean();
    }

    /// Reset the task counter, then force every given store or template
    /// back to its initial unmounted state, ignoring grace delays.
    pub fn clean_stores(&self, stores: &[&dyn Clean]) {
        self.clean_tasks();
        for store in stores {
            store.clean();
        }
    }

    /// Run `job` after `delay`.
    ///
    /// A zero delay runs the job inline. Otherwise the job is spawned on the
    /// ambient tokio runtime, or on the shared timer runtime when there is
    /// none.
    pub(crate) fn schedule_after<F>(&self, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if delay.is_zero() {
            job();
            return;
        }

        let handle = tokio::runtime::Handle::try_current()
            .ok()
            .or_else(|| timer_runtime().map(|timers| timers.handle().clone()));
        match handle {
            Some(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    job();
                });
            }
            None => {
                warn!(?delay, "timer runtime unavailable, sleeping on a dedicated thread");
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    job();
                });
            }
        }
    }
}

/// Runtime that drives delayed jobs scheduled outside of any tokio runtime.
///
/// Started on first use with a single worker thread and kept for the life of
/// the process.
fn timer_runtime() -> Option<&'static tokio::runtime::Runtime> {
    static TIMERS: OnceLock<Option<tokio::runtime::Runtime>> = OnceLock::new();
    TIMERS
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("strata-timer")
                .enable_time()
                .build()
                .map_err(|err| error!(%err, "failed to start the timer runtime"))
                .ok()
        })
        .as_ref()
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("scheduler", &self.inner.scheduler)
            .field("tasks", &self.inner.tasks)
            .finish()
    }
}
