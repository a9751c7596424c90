//! Reactive Stores
//!
//! This module implements the store types: atoms, map stores and computed
//! stores. These are the values the rest of Strata observes, intercepts and
//! derives from.
//!
//! # Concepts
//!
//! ## Atoms
//!
//! An Atom holds one value. Writing it with `set` notifies every listener
//! through the runtime's scheduler. Atoms do not compare values: every
//! `set` notifies.
//!
//! ## Map Stores
//!
//! A Map Store is an atom holding a string-keyed map. `set_key` writes one
//! key, notifies with that key, and stays silent when nothing changed.
//!
//! ## Computed Stores
//!
//! A Computed store derives its value from other stores. It listens to its
//! sources only while it is mounted, and recomputes at most once per source
//! change even when several of its sources share an ancestor.
//!
//! # Implementation Notes
//!
//! Dependencies are explicit: a computed store is given its sources when it
//! is created. There is no tracking context. Each store carries a level
//! instead, and the scheduler uses it to notify upstream listeners before
//! downstream ones.

mod atom;
mod computed;
mod map;
mod runtime;
mod store;
mod subscriber;

pub use atom::Atom;
pub use computed::{computed, computed_async, try_computed_async, Computed, SourceSubscriptions, Sources};
pub use map::{listen_keys, MapStore, MapValue};
pub use runtime::Runtime;
pub use store::{Clean, Store, StoreValue};
pub use subscriber::{HookId, ListenerId, StoreId, Subscription};
