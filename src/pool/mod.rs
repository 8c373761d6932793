//! The pool-facing surface of this crate.
//!
//! The pool allocator itself (sizing, fairness, shrinking) lives in the
//! enclosing transaction manager; holders consume the narrow
//! [`PoolManager`] surface defined here and never assume anything else
//! about the pool.

pub mod holder;
mod options;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use self::options::{PoolOptions, RequeueFailurePolicy};
use crate::{error::Result, event::pool::PoolEventHandler, pool::holder::PooledXaConnection};

/// Position of a resource in the two-phase commit order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOrdering {
    /// Commit this resource before all unconstrained resources.
    AlwaysFirst,

    /// No ordering constraint.
    #[default]
    Any,

    /// Commit this resource after all others. Required by resources that
    /// cannot prepare.
    AlwaysLast,
}

/// The surface a pool exposes to the holders it owns.
///
/// Holders keep a non-owning reference to their pool; the pool owns the
/// holders and learns of holder closure through
/// [`unregister`](PoolManager::unregister) rather than by drop.
pub trait PoolManager: Send + Sync {
    /// The unique name of this pool.
    fn unique_name(&self) -> &str;

    /// The configuration holders apply to their connections.
    fn options(&self) -> &PoolOptions;

    /// Mints the next pool-scoped holder id.
    fn next_holder_id(&self) -> u64;

    /// Returns `holder` to the free list.
    ///
    /// Implementations must drive the holder to
    /// [`HolderState::InPool`](crate::HolderState::InPool) via
    /// [`PooledXaConnection::mark_in_pool`] before exposing it to other
    /// acquirers, and must leave the holder's state untouched when they
    /// fail.
    fn requeue(&self, holder: &PooledXaConnection) -> Result<()>;

    /// Drops `holder` from the pool's registry. Invoked from holder close.
    fn unregister(&self, holder: &PooledXaConnection);

    /// The handler receiving lifecycle events, if any.
    fn event_handler(&self) -> Option<Arc<dyn PoolEventHandler>>;

    /// Forces the two-phase commit position of this pool's resources.
    fn set_commit_ordering(&self, ordering: CommitOrdering);

    /// Enables or disables deferred release.
    fn set_deferred_release(&self, enabled: bool);

    /// Whether a holder whose last handle is released inside a running
    /// transaction is parked instead of requeued.
    fn deferred_release(&self) -> bool;

    /// Forces joining of compatible enlistments within one transaction.
    fn set_tm_join(&self, enabled: bool);
}
