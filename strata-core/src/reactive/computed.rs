//! Computed Stores
//!
//! A computed store derives its value from one or more source stores through
//! a combiner. It sits one level above its highest source, so the scheduler
//! delivers source notifications before the computed store's own.
//!
//! # Activation
//!
//! A computed store only follows its sources while it is mounted. Mounting
//! subscribes to every source and runs the combiner once; unmounting drops
//! those subscriptions. Reading an idle computed store with `get` mounts it
//! briefly, so the value returned is never stale.
//!
//! # Diamond Suppression
//!
//! When two sources of one computed store share an upstream ancestor, a
//! single change reaches the computed store twice within one cascade. The
//! store remembers the inputs and the scheduler epoch of its last run and
//! skips a run where both are unchanged.
//!
//! ```text
//!        a
//!       / \
//!      b   c
//!       \ /
//!        d      a.set(..) recomputes d once, not twice
//! ```

use std::convert::Infallible;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use crate::config::AsyncPolicy;
use crate::error::StoreError;
use crate::graph::Level;
use crate::lifecycle::{on_mount, Teardown};

use super::{Atom, Clean, MapStore, Runtime, Store, StoreValue, Subscription};

/// Subscriptions a computed store holds on its sources while mounted.
pub type SourceSubscriptions = SmallVec<[Subscription; 4]>;

type Trigger = Arc<dyn Fn() + Send + Sync>;

/// Inputs of a computed store: one store, a tuple of stores, or a `Vec` of
/// stores with the same value type.
///
/// The combiner receives [`Sources::Values`]: the plain value for a single
/// store, a tuple of values for a tuple, and a `Vec` of values for a `Vec`.
pub trait Sources: Send + Sync + 'static {
    type Values: Clone + PartialEq + Send + Sync + 'static;

    /// Runtime the derived store is created in.
    fn source_runtime(&self) -> Runtime;

    /// Highest level among the sources.
    fn max_level(&self) -> Level;

    /// Current values without activating anything.
    fn peek_values(&self) -> Self::Values;

    /// Current values, activating idle sources first.
    fn read_values(&self) -> Self::Values;

    /// Call `trigger` whenever any source notifies, queued at `level`.
    fn listen_each(&self, level: Level, trigger: &Trigger) -> SourceSubscriptions;
}

macro_rules! store_sources {
    ($ty:ty => $value:ty, [$($bounds:tt)*]) => {
        impl<$($bounds)*> Sources for $ty {
            type Values = $value;

            fn source_runtime(&self) -> Runtime {
                Store::runtime(self).clone()
            }

            fn max_level(&self) -> Level {
                Store::level(self)
            }

            fn peek_values(&self) -> Self::Values {
                Store::peek(self)
            }

            fn read_values(&self) -> Self::Values {
                Store::get(self)
            }

            fn listen_each(&self, level: Level, trigger: &Trigger) -> SourceSubscriptions {
                let trigger = Arc::clone(trigger);
                smallvec![Store::listen_at(self, level, move |_, _| trigger())]
            }
        }
    };
}

store_sources!(Atom<T> => T, [T: StoreValue + PartialEq]);
store_sources!(Computed<T> => T, [T: StoreValue + PartialEq]);
store_sources!(MapStore<V> => super::MapValue<V>, [V: StoreValue + PartialEq]);

macro_rules! tuple_sources {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Sources),+> Sources for ($($name,)+) {
            type Values = ($($name::Values,)+);

            fn source_runtime(&self) -> Runtime {
                self.0.source_runtime()
            }

            fn max_level(&self) -> Level {
                Level::MIN $(.max(self.$idx.max_level()))+
            }

            fn peek_values(&self) -> Self::Values {
                ($(self.$idx.peek_values(),)+)
            }

            fn read_values(&self) -> Self::Values {
                ($(self.$idx.read_values(),)+)
            }

            fn listen_each(&self, level: Level, trigger: &Trigger) -> SourceSubscriptions {
                let mut subscriptions = SourceSubscriptions::new();
                $(subscriptions.extend(self.$idx.listen_each(level, trigger));)+
                subscriptions
            }
        }
    };
}

tuple_sources!(A: 0, B: 1);
tuple_sources!(A: 0, B: 1, C: 2);
tuple_sources!(A: 0, B: 1, C: 2, D: 3);

impl<S: Sources> Sources for Vec<S> {
    type Values = Vec<S::Values>;

    fn source_runtime(&self) -> Runtime {
        self.first()
            .map_or_else(Runtime::current, Sources::source_runtime)
    }

    fn max_level(&self) -> Level {
        self.iter().map(Sources::max_level).max().unwrap_or(0)
    }

    fn peek_values(&self) -> Self::Values {
        self.iter().map(Sources::peek_values).collect()
    }

    fn read_values(&self) -> Self::Values {
        self.iter().map(Sources::read_values).collect()
    }

    fn listen_each(&self, level: Level, trigger: &Trigger) -> SourceSubscriptions {
        self.iter()
            .flat_map(|source| source.listen_each(level, trigger))
            .collect()
    }
}

/// Inputs and epoch of the last combiner run.
struct LastRun<V> {
    epoch: u64,
    args: Option<V>,
    /// The last run seeded the value at construction and no mount has
    /// checked it yet.
    seeded: bool,
}

impl<V: Clone + PartialEq> LastRun<V> {
    fn new() -> Self {
        Self {
            epoch: 0,
            args: None,
            seeded: false,
        }
    }

    fn seeded(epoch: u64, args: V) -> Self {
        Self {
            epoch,
            args: Some(args),
            seeded: true,
        }
    }

    /// Record `args` at `epoch`. Returns `false` if the combiner already ran
    /// with these inputs in this epoch.
    ///
    /// The seed run counts for the first check whatever the epoch, so the
    /// first mount does not repeat it when the inputs are unchanged.
    fn advance(&mut self, epoch: u64, args: &V) -> bool {
        let seeded = std::mem::take(&mut self.seeded);
        if (seeded || self.epoch == epoch) && self.args.as_ref() == Some(args) {
            return false;
        }
        self.epoch = epoch;
        self.args = Some(args.clone());
        true
    }
}

/// A store derived from other stores.
///
/// Cannot be written from outside; it changes only when its combiner runs.
pub struct Computed<T> {
    atom: Atom<T>,
    error: Arc<Mutex<Option<Arc<StoreError>>>>,
}

impl<T: StoreValue> Computed<T> {
    fn from_atom(atom: Atom<T>) -> Self {
        Self {
            atom,
            error: Arc::new(Mutex::new(None)),
        }
    }

    /// Error from the latest asynchronous run, cleared by the next success.
    pub fn last_error(&self) -> Option<Arc<StoreError>> {
        self.error.lock().clone()
    }

    /// Subscribe to the sources and run `trigger` on every mount.
    fn follow<S: Sources>(&self, sources: Arc<S>, trigger: Trigger) {
        let level = self.atom.level();
        on_mount(&self.atom, move || {
            let subscriptions = sources.listen_each(level, &trigger);
            trigger();
            Some(Box::new(move || drop(subscriptions)) as Teardown)
        })
        .detach();
    }
}

/// Derive a store from `sources` with a synchronous combiner.
///
/// The combiner runs once right away to seed the value, and again on every
/// source change while the store is mounted. Mounting does not rerun it
/// unless the inputs changed since the seed.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
///
/// let a = atom(1);
/// let b = atom(2);
/// let sum = computed((a.clone(), b.clone()), |(x, y)| x + y);
/// assert_eq!(sum.get(), 3);
///
/// a.set(10);
/// assert_eq!(sum.get(), 12);
/// ```
pub fn computed<S, R, F>(sources: S, combine: F) -> Computed<R>
where
    S: Sources,
    R: StoreValue,
    F: Fn(S::Values) -> R + Send + Sync + 'static,
{
    let runtime = sources.source_runtime();
    let args = sources.peek_values();
    let last_run = Mutex::new(LastRun::seeded(runtime.epoch(), args.clone()));
    let derived = Computed::from_atom(Atom::with_level(
        &runtime,
        combine(args),
        sources.max_level() + 1,
    ));

    let sources = Arc::new(sources);
    let inputs = Arc::clone(&sources);
    let weak = derived.atom.downgrade();
    let trigger: Trigger = Arc::new(move || {
        let Some(atom) = weak.upgrade() else {
            return;
        };
        let args = inputs.read_values();
        if !last_run.lock().advance(atom.runtime().epoch(), &args) {
            trace!(store = %atom.id(), "diamond recomputation skipped");
            return;
        }
        atom.set(combine(args));
    });

    derived.follow(sources, trigger);
    derived
}

/// Derive a store from `sources` with an asynchronous combiner.
///
/// The value is `None` until the first run resolves. Runs are spawned on the
/// ambient tokio runtime and counted as tasks, so
/// [`Runtime::all_tasks`] waits for them. Overlapping runs resolve according
/// to the runtime's [`AsyncPolicy`].
pub fn computed_async<S, R, F, Fut>(sources: S, combine: F) -> Computed<Option<R>>
where
    S: Sources,
    R: StoreValue,
    F: Fn(S::Values) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    try_computed_async(sources, move |args| {
        let pending = combine(args);
        async move { Ok::<R, Infallible>(pending.await) }
    })
}

/// Like [`computed_async`], with a combiner that can fail.
///
/// A failed run leaves the previous value in place and is reported through
/// [`Computed::last_error`].
pub fn try_computed_async<S, R, E, F, Fut>(sources: S, combine: F) -> Computed<Option<R>>
where
    S: Sources,
    R: StoreValue,
    E: Display + Send + 'static,
    F: Fn(S::Values) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let runtime = sources.source_runtime();
    let derived = Computed::from_atom(Atom::with_level(&runtime, None, sources.max_level() + 1));

    let last_run = Mutex::new(LastRun::new());
    let in_flight = Arc::new(Mutex::new(InFlight::default()));
    let errors = Arc::clone(&derived.error);
    let sources = Arc::new(sources);
    let inputs = Arc::clone(&sources);
    let weak = derived.atom.downgrade();

    let trigger: Trigger = Arc::new(move || {
        let Some(atom) = weak.upgrade() else {
            return;
        };
        let args = inputs.read_values();
        if !last_run.lock().advance(atom.runtime().epoch(), &args) {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            let failure = StoreError::NoAsyncRuntime { store: atom.id() };
            error!(store = %atom.id(), "{failure}");
            *errors.lock() = Some(Arc::new(failure));
            return;
        };

        let policy = atom.runtime().config().async_policy;
        let generation = in_flight.lock().supersede(policy);
        let task = atom.runtime().start_task();
        let pending = combine(args);

        let target = atom.downgrade();
        let errors = Arc::clone(&errors);
        let flights = Arc::clone(&in_flight);
        let join = handle.spawn(async move {
            let _task = task;
            let outcome = pending.await;
            let Some(atom) = target.upgrade() else {
                return;
            };
            if policy != AsyncPolicy::LastResolvedWins && flights.lock().generation != generation {
                trace!(store = %atom.id(), generation, "stale async result dropped");
                return;
            }
            match outcome {
                Ok(value) => {
                    *errors.lock() = None;
                    atom.set(Some(value));
                }
                Err(err) => {
                    let failure = StoreError::Derivation {
                        store: atom.id(),
                        message: err.to_string(),
                    };
                    warn!(store = %atom.id(), "{failure}");
                    *errors.lock() = Some(Arc::new(failure));
                }
            }
        });
        in_flight.lock().handle = Some(join);
    });

    derived.follow(sources, trigger);
    derived
}

/// Bookkeeping for overlapping asynchronous runs.
#[derive(Default)]
struct InFlight {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl InFlight {
    /// Start a new run and return its generation.
    fn supersede(&mut self, policy: AsyncPolicy) -> u64 {
        self.generation += 1;
        if policy == AsyncPolicy::CancelSuperseded {
            if let Some(previous) = self.handle.take() {
                previous.abort();
            }
        }
        self.generation
    }
}

impl<T: StoreValue> Store for Computed<T> {
    type Value = T;

    fn as_atom(&self) -> &Atom<T> {
        &self.atom
    }
}

impl<T: StoreValue> Clean for Computed<T> {
    fn clean(&self) {
        self.atom.clean();
        *self.error.lock() = None;
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            error: Arc::clone(&self.error),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: StoreValue + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("atom", &self.atom)
            .field("last_error", &self.error.lock())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
