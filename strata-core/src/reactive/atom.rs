//! Atom Implementation
//!
//! An Atom is the fundamental store. It holds a value, a list of listeners
//! and the lifecycle state that hooks attach to. Map stores and computed
//! stores are thin wrappers around an atom.
//!
//! # How Atoms Work
//!
//! 1. `set` runs any set hooks (which may abort), stores the value and
//!    calls `notify`.
//!
//! 2. `notify` runs any notify hooks (which may abort), then hands one
//!    queued call per listener to the runtime's scheduler.
//!
//! 3. The first `listen` activates the store (start hooks, mount
//!    initializers). Dropping the last listener deactivates it (stop hooks,
//!    delayed mount teardown).
//!
//! # Locking
//!
//! No lock is held while user code runs. Listener and hook lists are
//! snapshotted before they are called, so listeners may freely read, write,
//! subscribe and unsubscribe from inside a notification.

use std::sync::{Arc, Weak};
use std::fmt::Debug;

use parking_lot::{Mutex, RwLock};

use crate::graph::{Level, Pending};
use crate::lifecycle::{self, mount, Lifecycle};

use super::{Clean, Runtime, Store, StoreId, StoreValue, Subscription, ListenerId};

/// A value listener: receives the new value and the changed key, if any.
pub(crate) type Listener<T> = Arc<dyn Fn(&T, Option<&str>) + Send + Sync>;

struct ListenerEntry<T> {
    id: ListenerId,
    level: Level,
    callback: Listener<T>,
}

pub(crate) struct AtomInner<T> {
    id: StoreId,
    runtime: Runtime,
    level: Level,
    value: RwLock<T>,
    listeners: Mutex<Vec<ListenerEntry<T>>>,
    lifecycle: Mutex<Lifecycle<T>>,
    action: Mutex<Option<Arc<str>>>,
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning an atom yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
///
/// let count = atom(0);
/// let _watch = count.listen(|value, _| println!("count is {value}"));
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Atom<T> {
    inner: Arc<AtomInner<T>>,
}

/// Non-owning handle to an atom.
pub(crate) struct WeakAtom<T> {
    inner: Weak<AtomInner<T>>,
}

impl<T> WeakAtom<T> {
    pub(crate) fn upgrade(&self) -> Option<Atom<T>> {
        self.inner.upgrade().map(|inner| Atom { inner })
    }
}

impl<T> Clone for WeakAtom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: StoreValue> Atom<T> {
    /// Create an atom in the current thread's runtime.
    pub fn new(value: T) -> Self {
        Self::with_level(&Runtime::current(), value, 0)
    }

    pub(crate) fn with_level(runtime: &Runtime, value: T, level: Level) -> Self {
        Self {
            inner: Arc::new(AtomInner {
                id: StoreId::new(),
                runtime: runtime.clone(),
                level,
                value: RwLock::new(value),
                listeners: Mutex::new(Vec::new()),
                lifecycle: Mutex::new(Lifecycle::default()),
                action: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn level(&self) -> Level {
        self.inner.level
    }

    /// Get the current value.
    ///
    /// With no listeners attached, a no-op listener is added and removed
    /// first. That runs mount initializers, so a computed store that nobody
    /// subscribes to still returns a fresh value.
    pub fn get(&self) -> T {
        self.touch();
        self.peek()
    }

    /// Mount and unmount an idle store once so its value is fresh.
    pub(crate) fn touch(&self) {
        if self.listener_count() == 0 {
            self.listen(|_, _| {}).unsubscribe();
        }
    }

    /// Get the current value without activating the store.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify listeners.
    ///
    /// Listeners are notified even when the value is unchanged.
    pub fn set(&self, value: T) {
        if !lifecycle::intercept_set(self, &value, None) {
            return;
        }
        *self.inner.value.write() = value;
        self.notify(None);
    }

    /// Set the value computed from the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.peek();
        self.set(f(&current));
    }

    /// Queue every listener with the current value.
    pub fn notify(&self, changed: Option<&str>) {
        if !lifecycle::intercept_notify(self, changed) {
            return;
        }

        let value = Arc::new(self.peek());
        let changed: Option<Arc<str>> = changed.map(Arc::from);
        let batch = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|entry| {
                let callback = Arc::clone(&entry.callback);
                let value = Arc::clone(&value);
                let changed = changed.clone();
                Pending::new(entry.level, move || callback(&value, changed.as_deref()))
            })
            .collect();

        self.inner.runtime.scheduler().dispatch(batch);
    }

    /// Register a listener at this atom's own level.
    pub fn listen<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, Option<&str>) + Send + Sync + 'static,
    {
        self.listen_at(self.inner.level, listener)
    }

    /// Register a listener queued at `level`.
    pub fn listen_at<F>(&self, level: Level, listener: F) -> Subscription
    where
        F: Fn(&T, Option<&str>) + Send + Sync + 'static,
    {
        if self.listener_count() == 0 {
            mount::activate(self);
        }

        let id = ListenerId::new();
        self.inner.listeners.lock().push(ListenerEntry {
            id,
            level,
            callback: Arc::new(listener),
        });

        let weak = self.downgrade();
        Subscription::new(move || {
            if let Some(atom) = weak.upgrade() {
                atom.remove_listener(id);
            }
        })
    }

    /// Register a listener and call it with the current value immediately.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T, Option<&str>) + Send + Sync + 'static,
    {
        self.subscribe_at(self.inner.level, listener)
    }

    pub fn subscribe_at<F>(&self, level: Level, listener: F) -> Subscription
    where
        F: Fn(&T, Option<&str>) + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);
        let registered = Arc::clone(&listener);
        let subscription = self.listen_at(level, move |value, changed| registered(value, changed));
        listener(&self.peek(), None);
        subscription
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.lifecycle.lock().active
    }

    /// Name of the action currently writing to this atom.
    pub fn last_action(&self) -> Option<Arc<str>> {
        self.inner.action.lock().clone()
    }

    pub(crate) fn swap_action(&self, action: Option<Arc<str>>) -> Option<Arc<str>> {
        std::mem::replace(&mut *self.inner.action.lock(), action)
    }

    pub(crate) fn lifecycle(&self) -> &Mutex<Lifecycle<T>> {
        &self.inner.lifecycle
    }

    pub(crate) fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Mutate the value in place without hooks or notification.
    pub(crate) fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.value.write())
    }

    pub(crate) fn downgrade(&self) -> WeakAtom<T> {
        WeakAtom {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn remove_listener(&self, id: ListenerId) {
        let now_idle = {
            let mut listeners = self.inner.listeners.lock();
            let Some(index) = listeners.iter().position(|entry| entry.id == id) else {
                return;
            };
            listeners.remove(index);
            listeners.is_empty()
        };

        if now_idle {
            mount::deactivate(self);
        }
    }
}

impl<T: StoreValue> Store for Atom<T> {
    type Value = T;

    fn as_atom(&self) -> &Atom<T> {
        self
    }
}

impl<T: StoreValue> Clean for Atom<T> {
    fn clean(&self) {
        let had_listeners = {
            let mut listeners = self.inner.listeners.lock();
            let had = !listeners.is_empty();
            listeners.clear();
            had
        };
        mount::force_unmount(self);
        if had_listeners {
            lifecycle::run_stop_hooks(self);
        }
    }
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Atom<T>
where
    T: StoreValue + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.inner.id)
            .field("level", &self.inner.level)
            .field("value", &self.peek())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        (count.clone(), count)
    }

    #[test]
    fn atom_get_and_set() {
        let runtime = Runtime::new();
        let atom = runtime.atom(0);
        assert_eq!(atom.get(), 0);

        atom.set(42);
        assert_eq!(atom.get(), 42);
    }

    #[test]
    fn atom_update() {
        let atom = Runtime::new().atom(10);
        atom.update(|v| v + 5);
        assert_eq!(atom.get(), 15);
    }

    #[test]
    fn atom_notifies_listeners_on_every_set() {
        let atom = Runtime::new().atom(0);
        let (calls, calls_clone) = counter();

        let _subscription = atom.listen(move |_, changed| {
            assert!(changed.is_none());
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        atom.set(1);
        atom.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listeners_receive_the_new_value() {
        let atom = Runtime::new().atom(String::from("a"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _subscription = atom.listen(move |value: &String, _| {
            seen_clone.lock().push(value.clone());
        });

        atom.set("b".into());
        atom.set("c".into());
        assert_eq!(*seen.lock(), vec!["b", "c"]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let atom = Runtime::new().atom(0);
        let (calls, calls_clone) = counter();

        let subscription = atom.listen(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        atom.set(1);
        subscription.unsubscribe();
        atom.set(2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(atom.listener_count(), 0);
    }

    #[test]
    fn subscribe_calls_immediately() {
        let atom = Runtime::new().atom(7);
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();

        let _subscription = atom.subscribe(move |value, _| {
            seen_clone.store(*value, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        atom.set(9);
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn listener_can_write_to_another_atom() {
        let runtime = Runtime::new();
        let source = runtime.atom(1);
        let mirror = runtime.atom(0);

        let target = mirror.clone();
        let _link = source.listen(move |value, _| target.set(value * 10));

        source.set(3);
        assert_eq!(mirror.get(), 30);
    }

    #[test]
    fn listener_added_during_notification_waits_for_next_change() {
        let atom = Runtime::new().atom(0);
        let (late_calls, late_clone) = counter();
        let held = Arc::new(Mutex::new(Vec::new()));

        let store = atom.clone();
        let held_clone = held.clone();
        let _outer = atom.listen(move |_, _| {
            let late = late_clone.clone();
            let subscription = store.listen(move |_, _| {
                late.fetch_add(1, Ordering::SeqCst);
            });
            held_clone.lock().push(subscription);
        });

        atom.set(1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        atom.set(2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clone_shares_state() {
        let atom1 = Runtime::new().atom(0);
        let atom2 = atom1.clone();

        atom1.set(42);
        assert_eq!(atom2.get(), 42);
        assert_eq!(atom1.id(), atom2.id());
    }

    #[test]
    fn clean_drops_listeners() {
        let atom = Runtime::new().atom(0);
        let (calls, calls_clone) = counter();

        atom.listen(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })
        .detach();

        atom.clean();
        atom.set(1);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(atom.listener_count(), 0);
    }
}
