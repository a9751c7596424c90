//! Notification Graph
//!
//! Stores form a dependency graph at runtime: a computed store listens to
//! its sources, and may itself be a source for other computed stores. The
//! graph is never materialized. Instead every store carries a *level*, an
//! integer approximating its depth:
//!
//! - Plain atoms and maps default to level 0.
//! - A computed store sits at `max(source levels) + 1`.
//!
//! When a change cascades through the graph, the [`NotifyScheduler`] uses
//! these levels to run upstream listeners before downstream ones, so a
//! computed store reads consistent inputs.
//!
//! # Design Decisions
//!
//! 1. We keep one flat queue instead of a topological sort because the graph
//!    is defined by listener registration and changes as stores mount and
//!    unmount. There is no edge list to sort.
//!
//! 2. Ordering is best-effort. An entry only waits behind lower-level entries
//!    that are already queued when it reaches the front.

mod scheduler;

pub(crate) use scheduler::Pending;
pub use scheduler::NotifyScheduler;

/// Approximate depth of a store in the dependency graph.
///
/// Lower levels are depended upon and are notified first.
pub type Level = u32;
