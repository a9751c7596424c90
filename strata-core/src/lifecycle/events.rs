//! Payloads handed to lifecycle hooks.
//!
//! Every hook registered for one event kind receives the same payload, so a
//! hook can leave data in `shared` for the hooks that run after it.

use serde_json::{Map, Value};

use crate::reactive::MapStore;

/// Scratch space carried along one event.
pub type Shared = Map<String, Value>;

/// A store is gaining its first listener.
#[derive(Debug, Default)]
pub struct StartEvent {
    pub shared: Shared,
}

/// A store lost its last listener.
#[derive(Debug, Default)]
pub struct StopEvent {
    pub shared: Shared,
}

/// A value is about to be written.
///
/// For a key write on a map store, `new_value` is the whole map as it will
/// look after the write and `changed` names the key.
#[derive(Debug)]
pub struct SetEvent<'a, T> {
    pub new_value: &'a T,
    pub changed: Option<&'a str>,
    /// Action tagging this write, if it happens inside one.
    pub action: Option<&'a str>,
    pub shared: Shared,
    aborted: bool,
}

impl<'a, T> SetEvent<'a, T> {
    pub(crate) fn new(new_value: &'a T, changed: Option<&'a str>, action: Option<&'a str>) -> Self {
        Self {
            new_value,
            changed,
            action,
            shared: Shared::new(),
            aborted: false,
        }
    }

    /// Veto the write. Hooks registered earlier still run.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

/// Listeners are about to be notified.
#[derive(Debug)]
pub struct NotifyEvent<'a> {
    pub changed: Option<&'a str>,
    pub action: Option<&'a str>,
    pub shared: Shared,
    aborted: bool,
}

impl<'a> NotifyEvent<'a> {
    pub(crate) fn new(changed: Option<&'a str>, action: Option<&'a str>) -> Self {
        Self {
            changed,
            action,
            shared: Shared::new(),
            aborted: false,
        }
    }

    /// Skip this notification.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

/// A template built a new store.
pub struct BuildEvent<'a, V> {
    pub id: &'a str,
    pub store: &'a MapStore<V>,
    pub shared: Shared,
}

impl<'a, V> BuildEvent<'a, V> {
    pub(crate) fn new(id: &'a str, store: &'a MapStore<V>) -> Self {
        Self {
            id,
            store,
            shared: Shared::new(),
        }
    }
}
