//! Contains the events and functionality for monitoring the lifecycle of
//! pooled XA connections.

use serde::Serialize;

/// Event emitted when a physical XA connection has been obtained and
/// wrapped in a holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct ConnectionAcquiredEvent {
    /// The unique name of the pool that owns the holder.
    pub pool_name: String,

    /// The pool-scoped id of the holder.
    pub holder_id: u64,
}

/// Event emitted when a logical handle is leased from a holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct ConnectionLeasedEvent {
    /// The unique name of the pool that owns the holder.
    pub pool_name: String,

    /// The pool-scoped id of the holder.
    pub holder_id: u64,

    /// Outstanding logical acquisitions after this lease.
    pub usage_count: u32,
}

/// Event emitted when the last outstanding handle on a holder has been
/// released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct ConnectionReleasedEvent {
    /// The unique name of the pool that owns the holder.
    pub pool_name: String,

    /// The pool-scoped id of the holder.
    pub holder_id: u64,
}

/// Event emitted when a holder is destroyed and its connections closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct ConnectionDestroyedEvent {
    /// The unique name of the pool that owns the holder.
    pub pool_name: String,

    /// The pool-scoped id of the holder.
    pub holder_id: u64,
}

/// Applications can implement this trait to specify custom logic to run on
/// each holder lifecycle event.
pub trait PoolEventHandler: Send + Sync {
    /// Invoked whenever a physical connection is acquired into a holder.
    fn handle_connection_acquired_event(&self, _event: ConnectionAcquiredEvent) {}

    /// Invoked whenever a logical handle is leased from a holder.
    fn handle_connection_leased_event(&self, _event: ConnectionLeasedEvent) {}

    /// Invoked whenever a holder's usage count returns to zero.
    fn handle_connection_released_event(&self, _event: ConnectionReleasedEvent) {}

    /// Invoked whenever a holder is destroyed.
    fn handle_connection_destroyed_event(&self, _event: ConnectionDestroyedEvent) {}
}
