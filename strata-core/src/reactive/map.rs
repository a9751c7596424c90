//! Map Store
//!
//! A map store is an atom whose value is a string-keyed map. On top of the
//! whole-value `set`, it supports writing one key at a time. Key writes
//! notify with the changed key so listeners can filter on it (see
//! [`listen_keys`]).

use std::collections::HashSet;
use std::fmt::Debug;

use indexmap::IndexMap;

use crate::lifecycle;

use super::{Atom, Clean, Runtime, Store, StoreValue, Subscription};

/// Value held by a [`MapStore`]. Keys keep insertion order.
pub type MapValue<V> = IndexMap<String, V>;

/// A store of keyed values with per-key writes.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
///
/// let profile = map(MapValue::from([("name".to_string(), "Ann".to_string())]));
/// let _watch = profile.listen(|value, changed| {
///     println!("{changed:?} changed, profile is now {value:?}");
/// });
///
/// profile.set_key("name", "Kate".to_string());
/// profile.delete_key("name");
/// ```
pub struct MapStore<V> {
    atom: Atom<MapValue<V>>,
}

impl<V> MapStore<V>
where
    V: StoreValue + PartialEq,
{
    /// Create a map store in the current thread's runtime.
    pub fn new(initial: MapValue<V>) -> Self {
        Runtime::current().map(initial)
    }

    pub(crate) fn from_atom(atom: Atom<MapValue<V>>) -> Self {
        Self { atom }
    }

    /// Replace the whole map and notify with no changed key.
    pub fn set(&self, value: MapValue<V>) {
        self.atom.set(value);
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&MapValue<V>) -> MapValue<V>,
    {
        self.atom.update(f);
    }

    /// Write one key. `None` deletes it.
    ///
    /// Deleting a missing key or writing an equal value changes nothing and
    /// notifies nobody.
    pub fn set_key(&self, key: &str, value: impl Into<Option<V>>) {
        let value = value.into();

        if lifecycle::has_set_hooks(&self.atom) {
            let mut preview = self.atom.peek();
            match &value {
                Some(v) => {
                    preview.insert(key.to_owned(), v.clone());
                }
                None => {
                    preview.shift_remove(key);
                }
            }
            if !lifecycle::intercept_set(&self.atom, &preview, Some(key)) {
                return;
            }
        }

        let changed = self.atom.write_with(|map| match value {
            None => map.shift_remove(key).is_some(),
            Some(value) => match map.get_mut(key) {
                Some(current) if *current == value => false,
                Some(current) => {
                    *current = value;
                    true
                }
                None => {
                    map.insert(key.to_owned(), value);
                    true
                }
            },
        });

        if changed {
            self.atom.notify(Some(key));
        }
    }

    pub fn delete_key(&self, key: &str) {
        self.set_key(key, None);
    }

    /// Value of one key.
    pub fn get_key(&self, key: &str) -> Option<V> {
        self.atom.touch();
        self.atom.read_with(|map| map.get(key).cloned())
    }

    pub fn notify(&self, changed: Option<&str>) {
        self.atom.notify(changed);
    }
}

/// Listen to a map store, but only for writes to `keys` and whole-value sets.
pub fn listen_keys<S, V, K, F>(store: &S, keys: K, listener: F) -> Subscription
where
    S: Store<Value = MapValue<V>>,
    V: StoreValue,
    K: IntoIterator,
    K::Item: Into<String>,
    F: Fn(&MapValue<V>, Option<&str>) + Send + Sync + 'static,
{
    let keys: HashSet<String> = keys.into_iter().map(Into::into).collect();
    store.listen(move |value, changed| match changed {
        Some(key) if !keys.contains(key) => {}
        _ => listener(value, changed),
    })
}

impl<V> Store for MapStore<V>
where
    V: StoreValue + PartialEq,
{
    type Value = MapValue<V>;

    fn as_atom(&self) -> &Atom<MapValue<V>> {
        &self.atom
    }
}

impl<V> Clean for MapStore<V>
where
    V: StoreValue + PartialEq,
{
    fn clean(&self) {
        self.atom.clean();
    }
}

impl<V> Clone for MapStore<V> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
        }
    }
}

impl<V> Debug for MapStore<V>
where
    V: StoreValue + PartialEq + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MapStore").field(&self.atom).finish()
    }
}
