//! The capability set shared by every store kind.

use std::sync::Arc;

use crate::graph::Level;

use super::{Atom, Runtime, StoreId, Subscription};

/// Bound satisfied by every value a store can hold.
pub trait StoreValue: Clone + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Send + Sync + 'static {}

/// Read and listen access common to atoms, maps and computed stores.
///
/// Every store is backed by an [`Atom`]; the provided methods forward to it.
/// Writing is not part of this trait because computed stores cannot be set
/// from outside.
pub trait Store: Clone + Send + Sync + 'static {
    type Value: StoreValue;

    /// The atom backing this store.
    fn as_atom(&self) -> &Atom<Self::Value>;

    fn id(&self) -> StoreId {
        self.as_atom().id()
    }

    fn runtime(&self) -> &Runtime {
        self.as_atom().runtime()
    }

    fn level(&self) -> Level {
        self.as_atom().level()
    }

    /// Current value. Briefly activates an idle store first so lazily
    /// computed values are fresh.
    fn get(&self) -> Self::Value {
        self.as_atom().get()
    }

    /// Current value without activating the store.
    fn peek(&self) -> Self::Value {
        self.as_atom().peek()
    }

    /// Call `listener` on every change, at this store's level.
    fn listen<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Self::Value, Option<&str>) + Send + Sync + 'static,
    {
        self.as_atom().listen(listener)
    }

    /// Call `listener` on every change, queued at `level`.
    fn listen_at<F>(&self, level: Level, listener: F) -> Subscription
    where
        F: Fn(&Self::Value, Option<&str>) + Send + Sync + 'static,
    {
        self.as_atom().listen_at(level, listener)
    }

    /// Like [`Store::listen`], and also call `listener` with the current value
    /// right away.
    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Self::Value, Option<&str>) + Send + Sync + 'static,
    {
        self.as_atom().subscribe(listener)
    }

    fn subscribe_at<F>(&self, level: Level, listener: F) -> Subscription
    where
        F: Fn(&Self::Value, Option<&str>) + Send + Sync + 'static,
    {
        self.as_atom().subscribe_at(level, listener)
    }

    fn listener_count(&self) -> usize {
        self.as_atom().listener_count()
    }

    /// Whether mount initializers have run and not been torn down yet.
    fn is_mounted(&self) -> bool {
        self.as_atom().is_mounted()
    }

    /// Name of the action whose write is in progress, if any.
    fn last_action(&self) -> Option<Arc<str>> {
        self.as_atom().last_action()
    }
}

/// Test-support reset, implemented by stores and templates.
pub trait Clean {
    /// Drop all listeners and run pending teardown immediately.
    fn clean(&self);
}
