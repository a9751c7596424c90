//! Hook registries.
//!
//! Each store owns one [`Lifecycle`]: an ordered list of hooks per event
//! kind plus the mount state. An empty list costs nothing at the call site,
//! so removing the last hook of a kind restores the plain behavior without
//! any patching.

use std::sync::Arc;

use tokio::time::Instant;

use crate::reactive::HookId;

use super::events::{BuildEvent, NotifyEvent, SetEvent, StartEvent, StopEvent};
use super::mount::Teardown;

pub(crate) type StartHook = dyn Fn(&mut StartEvent) + Send + Sync;
pub(crate) type StopHook = dyn Fn(&mut StopEvent) + Send + Sync;
pub(crate) type SetHook<T> = dyn Fn(&mut SetEvent<'_, T>) + Send + Sync;
pub(crate) type NotifyHook = dyn Fn(&mut NotifyEvent<'_>) + Send + Sync;
pub(crate) type MountHook = dyn Fn() -> Option<Teardown> + Send + Sync;
pub(crate) type BuildHook<V> = dyn Fn(&mut BuildEvent<'_, V>) + Send + Sync;

/// Hooks of one kind, in registration order.
pub(crate) struct HookList<H: ?Sized> {
    entries: Vec<(HookId, Arc<H>)>,
}

impl<H: ?Sized> HookList<H> {
    pub(crate) fn push(&mut self, id: HookId, hook: Arc<H>) {
        self.entries.push((id, hook));
    }

    pub(crate) fn remove(&mut self, id: HookId) {
        self.entries.retain(|(entry, _)| *entry != id);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the hooks, so they can run without the store lock held.
    pub(crate) fn snapshot(&self) -> Vec<Arc<H>> {
        self.entries.iter().map(|(_, hook)| Arc::clone(hook)).collect()
    }
}

impl<H: ?Sized> Default for HookList<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookKind {
    Start,
    Stop,
    Set,
    Notify,
    Mount,
}

/// Per-store hook lists and mount state.
pub(crate) struct Lifecycle<T> {
    pub(crate) start: HookList<StartHook>,
    pub(crate) stop: HookList<StopHook>,
    pub(crate) set: HookList<SetHook<T>>,
    pub(crate) notify: HookList<NotifyHook>,
    pub(crate) mount: HookList<MountHook>,
    /// Start hooks are running; a nested `listen` must not rerun them.
    pub(crate) starting: bool,
    /// Mount initializers ran and have not been torn down.
    pub(crate) active: bool,
    pub(crate) teardowns: Vec<Teardown>,
    /// When an idle store may tear down. Cleared when a listener returns.
    pub(crate) unmount_at: Option<Instant>,
    /// An unmount timer is pending. At most one per store.
    pub(crate) timer_armed: bool,
}

impl<T> Lifecycle<T> {
    pub(crate) fn remove(&mut self, kind: HookKind, id: HookId) {
        match kind {
            HookKind::Start => self.start.remove(id),
            HookKind::Stop => self.stop.remove(id),
            HookKind::Set => self.set.remove(id),
            HookKind::Notify => self.notify.remove(id),
            HookKind::Mount => self.mount.remove(id),
        }
    }
}

impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Self {
            start: HookList::default(),
            stop: HookList::default(),
            set: HookList::default(),
            notify: HookList::default(),
            mount: HookList::default(),
            starting: false,
            active: false,
            teardowns: Vec::new(),
            unmount_at: None,
            timer_armed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_list_removes_by_id() {
        let mut list: HookList<StartHook> = HookList::default();
        let first = HookId::new();
        let second = HookId::new();

        list.push(first, Arc::new(|_: &mut StartEvent| {}));
        list.push(second, Arc::new(|_: &mut StartEvent| {}));
        assert_eq!(list.snapshot().len(), 2);

        list.remove(first);
        assert_eq!(list.snapshot().len(), 1);

        list.remove(second);
        assert!(list.is_empty());
    }

    #[test]
    fn removing_an_unknown_id_is_a_no_op() {
        let mut lifecycle: Lifecycle<i32> = Lifecycle::default();
        lifecycle.stop.push(HookId::new(), Arc::new(|_: &mut StopEvent| {}));

        lifecycle.remove(HookKind::Stop, HookId::new());
        assert!(!lifecycle.stop.is_empty());
    }
}
