//! Traits implemented by vendor drivers whose connections are pooled by
//! this crate.
//!
//! All methods take `&self`: one physical connection may back several
//! logical handles participating in the same global transaction, so
//! implementations are expected to synchronize internally.

use std::time::Duration;

use crate::pool::holder::cache::StatementFingerprint;

/// Error type produced by vendor driver implementations.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// The result type for vendor driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// A physical connection obtained from a vendor XA data source.
///
/// One `XaConnection` backs exactly one holder; it is the source of both
/// the logical connection handed to callers and the XA resource handed to
/// the transaction manager.
pub trait XaConnection: Send + Sync {
    /// Mints the logical connection callers will use.
    fn connection(&self) -> DriverResult<Box<dyn Connection>>;

    /// The two-phase participant view of this connection.
    fn xa_resource(&self) -> &dyn XaResource;

    /// Closes the physical connection.
    fn close(&self) -> DriverResult<()>;
}

/// The resource-manager participant handed to the transaction manager at
/// enlist time.
pub trait XaResource: Send + Sync {
    /// Whether this resource and `other` are managed by the same resource
    /// manager, allowing their enlistments to be joined.
    fn same_rm(&self, other: &dyn XaResource) -> DriverResult<bool>;
}

/// A logical connection derived from an [`XaConnection`].
pub trait Connection: Send + Sync {
    /// Prepares a statement for the given fingerprint.
    fn prepare(&self, fingerprint: &StatementFingerprint) -> DriverResult<Box<dyn Statement>>;

    /// Sets the transaction isolation level to one of the `TRANSACTION_*`
    /// constants.
    fn set_transaction_isolation(&self, level: i32) -> DriverResult<()>;

    /// Sets the cursor holdability to one of the holdability constants.
    fn set_holdability(&self, holdability: i32) -> DriverResult<()>;

    /// Enables or disables auto-commit.
    fn set_auto_commit(&self, auto_commit: bool) -> DriverResult<()>;

    /// Discards any accumulated connection warnings.
    fn clear_warnings(&self) -> DriverResult<()>;

    /// Native liveness probe with a timeout. Only meaningful when
    /// [`api_version`](Connection::api_version) reports 4 or later.
    fn is_valid(&self, timeout: Duration) -> DriverResult<bool>;

    /// The driver API generation this connection implements. Drivers
    /// without a native liveness probe report 3.
    fn api_version(&self) -> u32 {
        4
    }

    /// Closes the logical connection.
    fn close(&self) -> DriverResult<()>;
}

/// A prepared statement.
pub trait Statement: Send + Sync {
    /// Bounds the execution time of subsequent executions.
    fn set_query_timeout(&self, timeout: Duration) -> DriverResult<()>;

    /// Executes the statement, returning a cursor over its results.
    fn execute(&self) -> DriverResult<Box<dyn ResultCursor>>;

    /// Closes the statement, releasing vendor-side resources.
    fn close(&self) -> DriverResult<()>;
}

/// A cursor over the results of an executed statement.
pub trait ResultCursor: Send {
    /// Closes the cursor.
    fn close(&mut self) -> DriverResult<()>;
}
