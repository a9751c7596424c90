//! Mount Controller
//!
//! A store mounts when it gains its first listener: registered initializers
//! run and their teardowns are kept. When the last listener goes away the
//! store is not torn down right away. A timer is armed for the runtime's
//! unmount delay, and the teardowns run only if the store is still idle when
//! it fires. Resubscribing inside that window keeps the store mounted.
//!
//! Each deactivation moves the store's unmount deadline. A store has at most
//! one pending timer: when it fires early because the deadline moved, it
//! re-arms for the remainder instead of tearing down, so a burst of
//! subscribe/unsubscribe cycles never piles up timers.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::reactive::{Atom, HookId, Store, StoreValue, Subscription};

use super::hooks::HookKind;
use super::{hook_subscription, run_start_hooks, run_stop_hooks};

/// Cleanup returned by a mount initializer.
pub type Teardown = Box<dyn FnOnce() + Send>;

/// Run `init` every time `store` mounts.
///
/// The teardown it returns, if any, runs when the store unmounts. Initializers
/// registered after the store already mounted wait for the next mount.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
///
/// let clock = atom(0u64);
/// on_mount(&clock, || {
///     println!("clock started");
///     Some(Box::new(|| println!("clock stopped")) as Teardown)
/// })
/// .detach();
/// ```
pub fn on_mount<S, F>(store: &S, init: F) -> Subscription
where
    S: Store,
    F: Fn() -> Option<Teardown> + Send + Sync + 'static,
{
    let atom = store.as_atom();
    let id = HookId::new();
    atom.lifecycle().lock().mount.push(id, Arc::new(init));
    hook_subscription(atom, HookKind::Mount, id)
}

/// Keep `store` mounted for the rest of its life.
pub fn keep_mount<S: Store>(store: &S) {
    store.listen(|_, _| {}).detach();
}

/// Called before the first listener is added.
pub(crate) fn activate<T: StoreValue>(atom: &Atom<T>) {
    run_start_hooks(atom);

    let inits = {
        let mut lifecycle = atom.lifecycle().lock();
        if lifecycle.active {
            // Back inside the grace window: the pending timer finds no deadline.
            lifecycle.unmount_at = None;
            return;
        }
        if lifecycle.mount.is_empty() {
            return;
        }
        lifecycle.active = true;
        lifecycle.mount.snapshot()
    };

    debug!(store = %atom.id(), initializers = inits.len(), "mounting store");
    let teardowns: Vec<_> = inits.iter().rev().filter_map(|init| init()).collect();
    atom.lifecycle().lock().teardowns.extend(teardowns);
}

/// Called after the last listener was removed.
pub(crate) fn deactivate<T: StoreValue>(atom: &Atom<T>) {
    run_stop_hooks(atom);

    let delay = atom.runtime().config().unmount_delay();
    {
        let mut lifecycle = atom.lifecycle().lock();
        if !lifecycle.active {
            return;
        }
        lifecycle.unmount_at = Some(Instant::now() + delay);
        if lifecycle.timer_armed {
            return;
        }
        lifecycle.timer_armed = true;
    }
    arm_unmount_timer(atom, delay);
}

fn arm_unmount_timer<T: StoreValue>(atom: &Atom<T>, delay: Duration) {
    let weak = atom.downgrade();
    atom.runtime().schedule_after(delay, move || {
        if let Some(atom) = weak.upgrade() {
            unmount_if_idle(&atom);
        }
    });
}

/// Tear down right away, whatever the listener count or timers say.
pub(crate) fn force_unmount<T: StoreValue>(atom: &Atom<T>) {
    let teardowns = {
        let mut lifecycle = atom.lifecycle().lock();
        lifecycle.active = false;
        lifecycle.unmount_at = None;
        std::mem::take(&mut lifecycle.teardowns)
    };
    run_teardowns(atom, teardowns);
}

/// Runs when an unmount timer fires. A returning listener clears the
/// deadline, so a missing one means the store is in use again.
fn unmount_if_idle<T: StoreValue>(atom: &Atom<T>) {
    let teardowns = {
        let mut lifecycle = atom.lifecycle().lock();
        let deadline = match lifecycle.unmount_at {
            Some(deadline) if lifecycle.active => deadline,
            _ => {
                lifecycle.timer_armed = false;
                lifecycle.unmount_at = None;
                return;
            }
        };
        let now = Instant::now();
        if now < deadline {
            drop(lifecycle);
            trace!(store = %atom.id(), "unmount deadline moved, re-arming timer");
            arm_unmount_timer(atom, deadline - now);
            return;
        }
        lifecycle.timer_armed = false;
        lifecycle.unmount_at = None;
        lifecycle.active = false;
        std::mem::take(&mut lifecycle.teardowns)
    };
    run_teardowns(atom, teardowns);
}

fn run_teardowns<T: StoreValue>(atom: &Atom<T>, teardowns: Vec<Teardown>) {
    if teardowns.is_empty() {
        return;
    }
    debug!(store = %atom.id(), teardowns = teardowns.len(), "unmounting store");
    for teardown in teardowns {
        teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::reactive::{Clean, Runtime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_mount(atom: &Atom<i32>) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let mounts = Arc::new(AtomicUsize::new(0));
        let unmounts = Arc::new(AtomicUsize::new(0));
        let (m, u) = (mounts.clone(), unmounts.clone());
        on_mount(atom, move || {
            m.fetch_add(1, Ordering::SeqCst);
            let u = u.clone();
            Some(Box::new(move || {
                u.fetch_add(1, Ordering::SeqCst);
            }) as Teardown)
        })
        .detach();
        (mounts, unmounts)
    }

    #[test]
    fn zero_delay_unmounts_synchronously() {
        let runtime = Runtime::with_config(RuntimeConfig::default().with_unmount_delay(Duration::ZERO));
        let atom = runtime.atom(0);
        let (mounts, unmounts) = counted_mount(&atom);

        let subscription = atom.listen(|_, _| {});
        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert!(atom.is_mounted());

        subscription.unsubscribe();
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
        assert!(!atom.is_mounted());
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_waits_for_the_grace_delay() {
        let atom = Runtime::new().atom(0);
        let (mounts, unmounts) = counted_mount(&atom);

        atom.listen(|_, _| {}).unsubscribe();
        assert_eq!(mounts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(unmounts.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
        assert!(!atom.is_mounted());
    }

    #[tokio::test(start_paused = true)]
    async fn resubscribing_in_the_window_keeps_the_store_mounted() {
        let atom = Runtime::new().atom(0);
        let (mounts, unmounts) = counted_mount(&atom);

        atom.listen(|_, _| {}).unsubscribe();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let held = atom.listen(|_, _| {});

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert_eq!(unmounts.load(Ordering::SeqCst), 0);
        drop(held);
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_latest_timer_unmounts() {
        let atom = Runtime::new().atom(0);
        let (_, unmounts) = counted_mount(&atom);

        atom.listen(|_, _| {}).unsubscribe();
        tokio::time::sleep(Duration::from_millis(600)).await;
        atom.listen(|_, _| {}).unsubscribe();

        // The first timer fires here and must not act.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(unmounts.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeated_idle_reads_share_one_timer() {
        let runtime =
            Runtime::with_config(RuntimeConfig::default().with_unmount_delay(Duration::from_millis(200)));
        let atom = runtime.atom(0);
        let (mounts, unmounts) = counted_mount(&atom);

        for _ in 0..100 {
            atom.get();
            assert!(atom.lifecycle().lock().timer_armed);
        }
        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert!(atom.is_mounted());

        std::thread::sleep(Duration::from_millis(800));
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
        assert!(!atom.is_mounted());
        assert!(!atom.lifecycle().lock().timer_armed);
    }

    #[test]
    fn clean_runs_teardown_immediately() {
        let atom = Runtime::new().atom(0);
        let (_, unmounts) = counted_mount(&atom);

        keep_mount(&atom);
        atom.clean();

        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
        assert!(!atom.is_mounted());
        assert_eq!(atom.listener_count(), 0);
    }
}
