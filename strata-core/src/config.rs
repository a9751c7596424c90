//! Runtime configuration.
//!
//! A [`RuntimeConfig`] is fixed when a [`Runtime`](crate::Runtime) is
//! created. It can be built in code or parsed from JSON:
//!
//! ```rust
//! use strata_core::{AsyncPolicy, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_json(r#"{ "unmount_delay_ms": 250 }"#).unwrap();
//! assert_eq!(config.unmount_delay_ms, 250);
//! assert_eq!(config.async_policy, AsyncPolicy::IgnoreStale);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Grace period between losing the last listener and running mount teardown.
pub const STORE_UNMOUNT_DELAY: Duration = Duration::from_millis(1000);

/// What happens when an asynchronous combiner is re-run before its previous
/// run resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncPolicy {
    /// Results from superseded runs are discarded when they resolve.
    #[default]
    IgnoreStale,

    /// Starting a new run aborts the one in flight.
    CancelSuperseded,

    /// Every run writes its result when it resolves; the last to resolve wins.
    LastResolvedWins,
}

/// Configuration for one runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Milliseconds a mounted store waits with zero listeners before its
    /// teardown runs. Zero tears down inside the unsubscribe call.
    pub unmount_delay_ms: u64,

    /// Resolution policy for overlapping async combiner runs.
    pub async_policy: AsyncPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            unmount_delay_ms: STORE_UNMOUNT_DELAY.as_millis() as u64,
            async_policy: AsyncPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The unmount grace period as a [`Duration`].
    pub fn unmount_delay(&self) -> Duration {
        Duration::from_millis(self.unmount_delay_ms)
    }

    pub fn with_unmount_delay(mut self, delay: Duration) -> Self {
        self.unmount_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_async_policy(mut self, policy: AsyncPolicy) -> Self {
        self.async_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn defaults_match_the_unmount_constant() {
        let config = RuntimeConfig::default();
        assert_eq!(config.unmount_delay(), STORE_UNMOUNT_DELAY);
        assert_eq!(config.async_policy, AsyncPolicy::IgnoreStale);
    }

    #[test]
    fn parses_partial_json() {
        let config = RuntimeConfig::from_json(r#"{ "async_policy": "cancel_superseded" }"#).unwrap();
        assert_eq!(config.async_policy, AsyncPolicy::CancelSuperseded);
        assert_eq!(config.unmount_delay_ms, 1000);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = RuntimeConfig::from_json(r#"{ "unmount_delay": 5 }"#).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn builders_override_fields() {
        let config = RuntimeConfig::default()
            .with_unmount_delay(Duration::ZERO)
            .with_async_policy(AsyncPolicy::LastResolvedWins);
        assert_eq!(config.unmount_delay_ms, 0);
        assert_eq!(config.async_policy, AsyncPolicy::LastResolvedWins);
    }
}
