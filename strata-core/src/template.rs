//! Map Templates
//!
//! A template hands out one map store per id. The first request for an id
//! builds a store seeded with `{"id": id}` and caches it; later requests get
//! the cached store. Built stores run the template's initializer whenever
//! they mount, and drop out of the cache when they unmount, so an id that
//! nobody listens to any more is rebuilt fresh next time.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::lifecycle::{self, on_mount, BuildHook, HookList, Teardown};
use crate::reactive::{Clean, HookId, MapStore, MapValue, Runtime, Store, StoreId, StoreValue, Subscription};

type InitFn<V, A> = dyn Fn(&MapStore<V>, &str, &A) -> Option<Teardown> + Send + Sync;

struct TemplateInner<V, A> {
    runtime: Runtime,
    cache: DashMap<String, MapStore<V>>,
    init: Box<InitFn<V, A>>,
    build_hooks: Mutex<HookList<BuildHook<V>>>,
}

impl<V, A> TemplateInner<V, A>
where
    V: StoreValue + PartialEq,
{
    /// Remove `id` from the cache if it still maps to `store`.
    fn evict(&self, id: &str, store: StoreId) {
        if self.cache.remove_if(id, |_, cached| cached.id() == store).is_some() {
            debug!(id, %store, "template store evicted");
        }
    }
}

/// Keyed factory of map stores.
///
/// `A` is the type of the extra arguments passed to [`MapTemplate::get`] and
/// on to the initializer.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
///
/// let users = map_template(|store: &MapStore<String>, id: &str, _: &()| {
///     store.set_key("name", format!("user {id}"));
///     None
/// });
///
/// let ann = users.get("ann", ());
/// assert_eq!(ann.get_key("name").as_deref(), Some("user ann"));
/// assert_eq!(users.get("ann", ()).id(), ann.id());
/// ```
pub struct MapTemplate<V, A = ()> {
    inner: Arc<TemplateInner<V, A>>,
}

impl<V, A> MapTemplate<V, A>
where
    V: StoreValue + PartialEq + From<String>,
    A: Send + Sync + 'static,
{
    pub(crate) fn new<F>(runtime: &Runtime, init: F) -> Self
    where
        F: Fn(&MapStore<V>, &str, &A) -> Option<Teardown> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TemplateInner {
                runtime: runtime.clone(),
                cache: DashMap::new(),
                init: Box::new(init),
                build_hooks: Mutex::new(HookList::default()),
            }),
        }
    }

    /// The store for `id`, built with `args` if it is not cached.
    pub fn get(&self, id: &str, args: A) -> MapStore<V> {
        if let Some(store) = self.cached(id) {
            return store;
        }
        let built = self.build(id, args);
        // Another thread may have cached a store for `id` meanwhile.
        self.inner.cache.entry(id.to_owned()).or_insert(built).value().clone()
    }

    /// Build a new store for `id` without touching the cache.
    pub fn build(&self, id: &str, args: A) -> MapStore<V> {
        let store = self
            .inner
            .runtime
            .map(MapValue::from([("id".to_owned(), V::from(id.to_owned()))]));

        let args = Arc::new(args);
        let template = Arc::downgrade(&self.inner);
        let weak = store.as_atom().downgrade();
        let store_id = store.id();
        let key = id.to_owned();
        on_mount(&store, move || {
            let inner = template.upgrade()?;
            let store = MapStore::from_atom(weak.upgrade()?);
            let destroy = (inner.init)(&store, key.as_str(), &*args);

            let template: Weak<TemplateInner<V, A>> = Arc::downgrade(&inner);
            let key = key.clone();
            Some(Box::new(move || {
                if let Some(inner) = template.upgrade() {
                    inner.evict(&key, store_id);
                }
                if let Some(destroy) = destroy {
                    destroy();
                }
            }) as Teardown)
        })
        .detach();

        debug!(id, store = %store_id, "template store built");
        let hooks = self.inner.build_hooks.lock().snapshot();
        lifecycle::run_build_hooks(hooks, id, &store);
        store
    }

    /// The cached store for `id`, if any.
    pub fn cached(&self, id: &str) -> Option<MapStore<V>> {
        self.inner.cache.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.is_empty()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub(crate) fn add_build_hook(&self, hook: Arc<BuildHook<V>>) -> Subscription {
        let id = HookId::new();
        self.inner.build_hooks.lock().push(id, hook);
        let template = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = template.upgrade() {
                inner.build_hooks.lock().remove(id);
            }
        })
    }
}

impl<V, A> Clean for MapTemplate<V, A>
where
    V: StoreValue + PartialEq + From<String>,
    A: Send + Sync + 'static,
{
    fn clean(&self) {
        let stores: Vec<MapStore<V>> = self
            .inner
            .cache
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.inner.cache.clear();
        for store in stores {
            store.clean();
        }
    }
}

impl<V, A> Clone for MapTemplate<V, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, A> std::fmt::Debug for MapTemplate<V, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapTemplate")
            .field("cached", &self.inner.cache.len())
            .finish()
    }
}
