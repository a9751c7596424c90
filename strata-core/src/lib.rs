//! Strata Core
//!
//! This crate provides a small reactive state runtime. It implements:
//!
//! - Stores (atoms, keyed map stores, computed stores)
//! - A notification scheduler that orders delivery by graph level
//! - Lifecycle hooks to observe and intercept stores
//! - Lazy mounting with a grace delay before teardown
//! - Task tracking for awaiting outstanding asynchronous work
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: store types and the runtime they live in
//! - `graph`: levels and the notification scheduler
//! - `lifecycle`: start/stop/set/notify/mount/build hooks
//! - `template`: keyed factories of map stores
//! - `action`: named writes and async actions
//! - `task`: the outstanding-task counter
//!
//! # Example
//!
//! ```rust
//! use strata_core::prelude::*;
//!
//! // Create a source
//! let count = atom(1);
//!
//! // Derive a value from it
//! let doubled = computed(count.clone(), |value| value * 2);
//!
//! // React to changes
//! let _watch = doubled.subscribe(|value, _| println!("doubled: {value}"));
//!
//! // Update the source; prints "doubled: 10"
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//! ```
//!
//! Free functions such as [`atom`] and [`start_task`] use the calling
//! thread's default [`Runtime`]. Create a `Runtime` explicitly to isolate a
//! group of stores, for example in tests.

pub mod action;
pub mod config;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod reactive;
pub mod task;
pub mod template;

use std::future::Future;

pub use action::{action, async_action, ActionScope};
pub use config::{AsyncPolicy, RuntimeConfig, STORE_UNMOUNT_DELAY};
pub use error::{Result, StoreError};
pub use lifecycle::{keep_mount, on_build, on_mount, on_notify, on_set, on_start, on_stop, Teardown};
pub use reactive::{
    computed, computed_async, listen_keys, try_computed_async, Atom, Clean, Computed, MapStore, MapValue,
    Runtime, Sources, Store, StoreValue, Subscription,
};
pub use task::{TaskGuard, TaskTracker};
pub use template::MapTemplate;

/// Create an atom in the current thread's runtime.
pub fn atom<T: StoreValue>(value: T) -> Atom<T> {
    Runtime::current().atom(value)
}

/// Create a map store in the current thread's runtime.
pub fn map<V>(initial: MapValue<V>) -> MapStore<V>
where
    V: StoreValue + PartialEq,
{
    Runtime::current().map(initial)
}

/// Create a map template in the current thread's runtime.
pub fn map_template<V, A, F>(init: F) -> MapTemplate<V, A>
where
    V: StoreValue + PartialEq + From<String>,
    A: Send + Sync + 'static,
    F: Fn(&MapStore<V>, &str, &A) -> Option<Teardown> + Send + Sync + 'static,
{
    Runtime::current().map_template(init)
}

/// Register the start of a task in the current thread's runtime.
pub fn start_task() -> TaskGuard {
    Runtime::current().start_task()
}

/// Run a future as a task of the current thread's runtime.
///
/// The task is counted from the moment this is called.
pub fn task<F: Future>(work: F) -> impl Future<Output = F::Output> {
    Runtime::current().task(work)
}

/// Resolves once every task of the current thread's runtime has finished.
pub fn all_tasks() -> impl Future<Output = ()> + Send + 'static {
    Runtime::current().all_tasks()
}

/// Forget every pending task of the current thread's runtime.
pub fn clean_tasks() {
    Runtime::current().clean_tasks();
}

/// Reset the current thread's task counter and clean every given store.
pub fn clean_stores(stores: &[&dyn Clean]) {
    Runtime::current().clean_stores(stores);
}

/// Everything needed to define and use stores.
pub mod prelude {
    pub use crate::{
        action, all_tasks, async_action, atom, clean_stores, clean_tasks, computed, computed_async,
        keep_mount, listen_keys, map, map_template, on_build, on_mount, on_notify, on_set, on_start,
        on_stop, start_task, task, try_computed_async, ActionScope, Atom, Clean, Computed, MapStore,
        MapTemplate, MapValue, Runtime, Store, Subscription, Teardown,
    };
}
