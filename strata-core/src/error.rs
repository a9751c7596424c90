//! Error types for store operations.
//!
//! Most store operations cannot fail: a listener or combiner that panics
//! unwinds to the `set`/`notify` caller, and a lifecycle abort is a normal
//! outcome rather than an error. What remains is configuration parsing and
//! asynchronous derivations, which resolve away from their call site.

use crate::reactive::StoreId;

/// Errors surfaced by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// An asynchronous combiner resolved to an error. The computed store
    /// keeps its previous value.
    #[error("derivation for store {store} failed: {message}")]
    Derivation { store: StoreId, message: String },

    /// An asynchronous combiner was triggered with no tokio runtime to run it on.
    #[error("store {store} has an async combiner but no tokio runtime is running")]
    NoAsyncRuntime { store: StoreId },
}

/// Result alias for fallible runtime operations.
pub type Result<T> = std::result::Result<T, StoreError>;
