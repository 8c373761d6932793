use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// What a holder does when the pool rejects it at requeue time after it has
/// already been delisted from its transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequeueFailurePolicy {
    /// Restore the usage count and keep the holder accessible; the next
    /// acquisition creates a fresh enlistment.
    #[default]
    KeepAccessible,

    /// Mark the holder unusable so further acquisitions fail and the pool
    /// discards it.
    Poison,
}

/// Configuration a pool exposes to its holders.
#[derive(Clone, Debug, TypedBuilder, Serialize, Deserialize)]
#[builder(field_defaults(default))]
#[serde(default)]
#[non_exhaustive]
pub struct PoolOptions {
    /// Symbolic or numeric transaction isolation level applied on first
    /// acquisition, e.g. `"READ_COMMITTED"`.
    pub isolation_level: Option<String>,

    /// Symbolic cursor holdability applied on first acquisition.
    pub cursor_holdability: Option<String>,

    /// `"true"` or `"false"`, applied on first acquisition when no global
    /// transaction is ambient.
    pub local_auto_commit: Option<String>,

    /// Liveness query run against a connection on its way out of the pool.
    pub test_query: Option<String>,

    /// Whether the native validity probe may be used for liveness checks on
    /// drivers that support it.
    #[builder(default = true)]
    pub enable_validity_probe: bool,

    /// Time allowed for the validity probe and the test query.
    #[builder(default = Duration::from_secs(10))]
    pub connection_test_timeout: Duration,

    /// Bound of the per-holder prepared statement cache; 0 disables
    /// caching.
    pub statement_cache_size: usize,

    /// Whether several logical handles within one global transaction may
    /// share a holder.
    pub share_transaction_connections: bool,

    /// Whether the underlying data source is the last-resource-commit
    /// emulator. Such a resource cannot prepare, so its holders force the
    /// pool into always-last commit ordering, deferred release and
    /// enlistment joining.
    pub last_resource_emulation: bool,

    /// Behavior when requeueing fails after a successful delist.
    pub requeue_failure_policy: RequeueFailurePolicy,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::PoolOptions;

    #[test]
    fn defaults_leave_session_settings_untouched() {
        let options = PoolOptions::default();
        assert_eq!(options.isolation_level, None);
        assert_eq!(options.cursor_holdability, None);
        assert_eq!(options.local_auto_commit, None);
        assert_eq!(options.test_query, None);
        assert!(options.enable_validity_probe);
        assert_eq!(options.connection_test_timeout, Duration::from_secs(10));
        assert_eq!(options.statement_cache_size, 0);
        assert!(!options.share_transaction_connections);
        assert!(!options.last_resource_emulation);
    }
}
