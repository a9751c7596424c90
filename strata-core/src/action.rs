//! Named Actions
//!
//! An action is a function that writes to one store under a name. Every
//! write made through its [`ActionScope`] is tagged with that name, which
//! lifecycle hooks see as [`SetEvent::action`](crate::lifecycle::SetEvent)
//! and listeners can read back with [`Store::last_action`] while the write
//! is being delivered.
//!
//! Asynchronous actions are also counted as tasks, so
//! [`Runtime::all_tasks`](crate::Runtime::all_tasks) waits for them.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::reactive::{Atom, MapStore, MapValue, Store, StoreValue};

/// Handle through which an action writes to its store.
#[derive(Clone)]
pub struct ActionScope<S> {
    store: S,
    name: Arc<str>,
}

impl<S: Store> ActionScope<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The untagged store, for reads.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get(&self) -> S::Value {
        self.store.get()
    }

    /// Run `write` with this action's name on the store.
    fn tagged<R>(&self, write: impl FnOnce(&S) -> R) -> R {
        let atom = self.store.as_atom();
        let previous = atom.swap_action(Some(Arc::clone(&self.name)));
        let _restore = RestoreAction { atom, previous };
        write(&self.store)
    }
}

impl<T: StoreValue> ActionScope<Atom<T>> {
    pub fn set(&self, value: T) {
        self.tagged(|store| store.set(value));
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.tagged(|store| store.update(f));
    }
}

impl<V: StoreValue + PartialEq> ActionScope<MapStore<V>> {
    pub fn set(&self, value: MapValue<V>) {
        self.tagged(|store| store.set(value));
    }

    pub fn set_key(&self, key: &str, value: impl Into<Option<V>>) {
        self.tagged(|store| store.set_key(key, value));
    }

    pub fn delete_key(&self, key: &str) {
        self.tagged(|store| store.delete_key(key));
    }
}

struct RestoreAction<'a, T: StoreValue> {
    atom: &'a Atom<T>,
    previous: Option<Arc<str>>,
}

impl<T: StoreValue> Drop for RestoreAction<'_, T> {
    fn drop(&mut self) {
        self.atom.swap_action(self.previous.take());
    }
}

/// Wrap `f` as an action named `name` on `store`.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
///
/// let counter = atom(0);
/// let increase = action(&counter, "increase", |scope, by: i32| {
///     scope.update(|value| value + by);
/// });
///
/// increase(5);
/// assert_eq!(counter.get(), 5);
/// ```
pub fn action<S, A, R, F>(store: &S, name: impl Into<Arc<str>>, f: F) -> impl Fn(A) -> R + Send + Sync
where
    S: Store,
    F: Fn(&ActionScope<S>, A) -> R + Send + Sync + 'static,
{
    let scope = ActionScope {
        store: store.clone(),
        name: name.into(),
    };
    move |args| f(&scope, args)
}

/// Wrap an asynchronous `f` as an action named `name` on `store`.
///
/// The task starts when the returned function is called and ends when the
/// future it returns completes or is dropped.
pub fn async_action<S, A, R, F, Fut>(
    store: &S,
    name: impl Into<Arc<str>>,
    f: F,
) -> impl Fn(A) -> BoxFuture<'static, R> + Send + Sync
where
    S: Store,
    R: Send + 'static,
    F: Fn(ActionScope<S>, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let scope = ActionScope {
        store: store.clone(),
        name: name.into(),
    };
    move |args| {
        let task = scope.store.runtime().start_task();
        let pending = f(scope.clone(), args);
        async move {
            let output = pending.await;
            task.end();
            output
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::on_set;
    use crate::reactive::Runtime;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn writes_are_tagged_with_the_action_name() {
        let store = Runtime::new().atom(0);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let hook_sink = seen.clone();
        let _hook = on_set(&store, move |event| {
            hook_sink.lock().push(format!("set:{:?}", event.action));
        });
        let listener_store = store.clone();
        let listener_sink = seen.clone();
        let _listener = store.listen(move |_, _| {
            listener_sink
                .lock()
                .push(format!("listen:{:?}", listener_store.last_action().as_deref()));
        });

        let bump = action(&store, "bump", |scope, by: i32| scope.update(|v| v + by));
        bump(2);
        store.set(10);

        assert_eq!(
            *seen.lock(),
            vec![
                "set:Some(\"bump\")",
                "listen:Some(\"bump\")",
                "set:None",
                "listen:None",
            ]
        );
        assert_eq!(store.get(), 10);
        assert!(store.last_action().is_none());
    }

    #[test]
    fn map_actions_tag_key_writes() {
        let store = Runtime::new().map(MapValue::<String>::new());
        let actions = Arc::new(Mutex::new(Vec::new()));

        let sink = actions.clone();
        let _hook = on_set(&store, move |event| {
            sink.lock().push((event.changed.map(str::to_owned), event.action.map(str::to_owned)));
        });

        let rename = action(&store, "rename", |scope, name: String| {
            scope.set_key("name", name);
        });
        rename("Kate".to_string());

        assert_eq!(
            *actions.lock(),
            vec![(Some("name".to_string()), Some("rename".to_string()))]
        );
        assert_eq!(store.get_key("name").as_deref(), Some("Kate"));
    }

    #[tokio::test(start_paused = true)]
    async fn async_actions_are_tracked_tasks() {
        let runtime = Runtime::new();
        let store = runtime.atom(String::new());

        let load = async_action(&store, "load", |scope, id: u32| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            scope.set(format!("user {id}"));
            id
        });

        let pending = load(7);
        assert_eq!(runtime.tasks().pending(), 1);

        let handle = tokio::spawn(pending);
        runtime.all_tasks().await;

        assert_eq!(store.get(), "user 7");
        assert_eq!(handle.await.unwrap(), 7);
        assert_eq!(runtime.tasks().pending(), 0);
    }
}
