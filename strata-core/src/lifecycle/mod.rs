//! Lifecycle Events
//!
//! External code can observe and intercept what a store does:
//!
//! - `on_start`: the store is about to gain its first listener.
//! - `on_stop`: the store lost its last listener.
//! - `on_set`: a value is about to be written. Hooks may abort the write.
//! - `on_notify`: listeners are about to be notified. Hooks may abort.
//! - `on_mount`: run an initializer on mount, with a delayed teardown.
//! - `on_build`: a map template built a new store.
//!
//! Hooks of one kind run last-registered-first and share one event payload.
//! Every registration returns a [`Subscription`]; once the last hook of a
//! kind is gone the store behaves exactly as if none had been registered.

mod events;
mod hooks;
pub(crate) mod mount;

use std::sync::Arc;

use crate::reactive::{Atom, HookId, MapStore, Store, StoreValue, Subscription};
use crate::template::MapTemplate;

pub use events::{BuildEvent, NotifyEvent, SetEvent, Shared, StartEvent, StopEvent};
pub(crate) use hooks::{BuildHook, HookList, Lifecycle};
pub use mount::{keep_mount, on_mount, Teardown};

use hooks::HookKind;

/// Run `listener` whenever `store` goes from zero listeners to one.
pub fn on_start<S, F>(store: &S, listener: F) -> Subscription
where
    S: Store,
    F: Fn(&mut StartEvent) + Send + Sync + 'static,
{
    let atom = store.as_atom();
    let id = HookId::new();
    atom.lifecycle().lock().start.push(id, Arc::new(listener));
    hook_subscription(atom, HookKind::Start, id)
}

/// Run `listener` whenever `store` loses its last listener.
pub fn on_stop<S, F>(store: &S, listener: F) -> Subscription
where
    S: Store,
    F: Fn(&mut StopEvent) + Send + Sync + 'static,
{
    let atom = store.as_atom();
    let id = HookId::new();
    atom.lifecycle().lock().stop.push(id, Arc::new(listener));
    hook_subscription(atom, HookKind::Stop, id)
}

/// Run `listener` before every write to `store`.
///
/// Calling [`SetEvent::abort`] drops the write.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
///
/// let age = atom(30);
/// on_set(&age, |event| {
///     if *event.new_value < 0 {
///         event.abort();
///     }
/// })
/// .detach();
///
/// age.set(-1);
/// assert_eq!(age.get(), 30);
/// ```
pub fn on_set<S, F>(store: &S, listener: F) -> Subscription
where
    S: Store,
    F: Fn(&mut SetEvent<'_, S::Value>) + Send + Sync + 'static,
{
    let atom = store.as_atom();
    let id = HookId::new();
    atom.lifecycle().lock().set.push(id, Arc::new(listener));
    hook_subscription(atom, HookKind::Set, id)
}

/// Run `listener` before every notification from `store`.
///
/// Calling [`NotifyEvent::abort`] keeps listeners from hearing about it. The
/// value itself is already written.
pub fn on_notify<S, F>(store: &S, listener: F) -> Subscription
where
    S: Store,
    F: Fn(&mut NotifyEvent<'_>) + Send + Sync + 'static,
{
    let atom = store.as_atom();
    let id = HookId::new();
    atom.lifecycle().lock().notify.push(id, Arc::new(listener));
    hook_subscription(atom, HookKind::Notify, id)
}

/// Run `listener` every time `template` builds a store.
pub fn on_build<V, A, F>(template: &MapTemplate<V, A>, listener: F) -> Subscription
where
    V: StoreValue + PartialEq + From<String>,
    A: Send + Sync + 'static,
    F: Fn(&mut BuildEvent<'_, V>) + Send + Sync + 'static,
{
    template.add_build_hook(Arc::new(listener))
}

pub(crate) fn hook_subscription<T: StoreValue>(
    atom: &Atom<T>,
    kind: HookKind,
    id: HookId,
) -> Subscription {
    let weak = atom.downgrade();
    Subscription::new(move || {
        if let Some(atom) = weak.upgrade() {
            atom.lifecycle().lock().remove(kind, id);
        }
    })
}

pub(crate) fn run_start_hooks<T: StoreValue>(atom: &Atom<T>) {
    let hooks = {
        let mut lifecycle = atom.lifecycle().lock();
        if lifecycle.starting || lifecycle.start.is_empty() {
            return;
        }
        lifecycle.starting = true;
        lifecycle.start.snapshot()
    };

    // Reset the flag even if a hook panics.
    struct Starting<'a, T: StoreValue>(&'a Atom<T>);
    impl<T: StoreValue> Drop for Starting<'_, T> {
        fn drop(&mut self) {
            self.0.lifecycle().lock().starting = false;
        }
    }
    let _starting = Starting(atom);

    let mut event = StartEvent::default();
    for hook in hooks.iter().rev() {
        hook(&mut event);
    }
}

pub(crate) fn run_stop_hooks<T: StoreValue>(atom: &Atom<T>) {
    let hooks = atom.lifecycle().lock().stop.snapshot();
    let mut event = StopEvent::default();
    for hook in hooks.iter().rev() {
        hook(&mut event);
    }
}

/// Returns `false` if a hook aborted the write.
pub(crate) fn intercept_set<T: StoreValue>(atom: &Atom<T>, value: &T, changed: Option<&str>) -> bool {
    let hooks = atom.lifecycle().lock().set.snapshot();
    if hooks.is_empty() {
        return true;
    }
    let action = atom.last_action();
    let mut event = SetEvent::new(value, changed, action.as_deref());
    for hook in hooks.iter().rev() {
        hook(&mut event);
    }
    !event.is_aborted()
}

/// Returns `false` if a hook aborted the notification.
pub(crate) fn intercept_notify<T: StoreValue>(atom: &Atom<T>, changed: Option<&str>) -> bool {
    let hooks = atom.lifecycle().lock().notify.snapshot();
    if hooks.is_empty() {
        return true;
    }
    let action = atom.last_action();
    let mut event = NotifyEvent::new(changed, action.as_deref());
    for hook in hooks.iter().rev() {
        hook(&mut event);
    }
    !event.is_aborted()
}

pub(crate) fn has_set_hooks<T: StoreValue>(atom: &Atom<T>) -> bool {
    !atom.lifecycle().lock().set.is_empty()
}

/// Run build hooks for a freshly built template store.
pub(crate) fn run_build_hooks<V: StoreValue>(
    hooks: Vec<Arc<BuildHook<V>>>,
    id: &str,
    store: &MapStore<V>,
) {
    let mut event = BuildEvent::new(id, store);
    for hook in hooks.iter().rev() {
        hook(&mut event);
    }
}
