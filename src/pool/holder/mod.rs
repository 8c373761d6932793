//! The pooled XA connection holder and its companions.
//!
//! A holder wraps one physical XA connection together with everything the
//! pool and the transaction manager need to share it safely: its lifecycle
//! state, the usage count of logical handles leased from it, the bounded
//! prepared-statement cache and the registry of statements living outside
//! that cache.

pub mod apply;
pub mod cache;
pub mod registry;
pub mod state;
mod validate;

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc, Mutex, Weak,
};

use derive_where::derive_where;
use tracing::{debug, error, trace, warn};

use self::{
    cache::{CachedStatement, StatementCache, StatementFingerprint},
    registry::{StatementToken, UncachedStatements},
    state::{HolderState, StateMachine, TransitionListener},
    validate::ConnectionValidator,
};
use crate::{
    clock::MonotonicClock,
    driver::{Connection, Statement, XaConnection},
    error::{Error, Result},
    event::pool::{
        ConnectionAcquiredEvent, ConnectionDestroyedEvent, ConnectionLeasedEvent,
        ConnectionReleasedEvent, PoolEventHandler,
    },
    mgmt::{self, ManagementRegistrar},
    pool::{CommitOrdering, PoolManager, PoolOptions, RequeueFailurePolicy},
    tx::{DelistError, Gtrid, TransactionCoordinator},
};

/// A pooled XA connection holder: one physical connection, the logical
/// connection derived from it, and the metadata needed to share both
/// between the pool, the transaction manager and the callers currently
/// holding handles.
#[derive_where(Debug)]
pub struct PooledXaConnection {
    #[derive_where(skip)]
    xa_conn: Box<dyn XaConnection>,
    #[derive_where(skip)]
    connection: Box<dyn Connection>,
    #[derive_where(skip)]
    pool: Weak<dyn PoolManager>,
    options: PoolOptions,
    #[derive_where(skip)]
    coordinator: Arc<dyn TransactionCoordinator>,
    #[derive_where(skip)]
    registrar: Arc<dyn ManagementRegistrar>,
    #[derive_where(skip)]
    event_handler: Option<Arc<dyn PoolEventHandler>>,
    clock: MonotonicClock,
    state: StateMachine,
    usage_count: AtomicU32,
    acquisition_date: AtomicU64,
    last_release_date: AtomicU64,
    validator: ConnectionValidator,
    #[derive_where(skip)]
    cache: StatementCache,
    #[derive_where(skip)]
    uncached: UncachedStatements,
    enlisted: Mutex<Vec<Gtrid>>,
    poisoned: AtomicBool,
    holder_id: u64,
    mgmt_id: String,
    pool_name: String,
}

impl PooledXaConnection {
    /// Wraps a freshly obtained vendor XA connection in a holder owned by
    /// `pool`.
    ///
    /// The holder starts in the pool, registered with `registrar` and with
    /// its statement cache wired to close evicted statements. When the pool
    /// is configured for last-resource emulation the pool-level two-phase
    /// settings that emulation requires are forced here, before the holder
    /// becomes visible.
    pub fn new(
        xa_conn: Box<dyn XaConnection>,
        pool: &Arc<dyn PoolManager>,
        coordinator: Arc<dyn TransactionCoordinator>,
        registrar: Arc<dyn ManagementRegistrar>,
    ) -> Result<Arc<Self>> {
        let connection = xa_conn.connection().map_err(Error::from_driver)?;
        let options = pool.options().clone();
        let holder_id = pool.next_holder_id();
        let pool_name = pool.unique_name().to_string();
        let mgmt_id = mgmt::management_id(&pool_name, holder_id);
        let clock = MonotonicClock::new();
        let now = clock.now_millis();

        if options.last_resource_emulation {
            // An emulated last resource cannot prepare: it must commit
            // last, its connection must stay checked out while enlisted,
            // and compatible enlistments must join.
            pool.set_commit_ordering(CommitOrdering::AlwaysLast);
            pool.set_deferred_release(true);
            pool.set_tm_join(true);
        }

        let validator = ConnectionValidator::new(connection.api_version(), &options);
        let cache = StatementCache::new(options.statement_cache_size);
        cache.set_eviction_hook(|stmt| {
            if let Err(error) = stmt.close() {
                warn!(error = %error, "failed to close evicted statement");
            }
        });

        let holder = Arc::new(Self {
            xa_conn,
            connection,
            pool: Arc::downgrade(pool),
            options,
            coordinator,
            registrar,
            event_handler: pool.event_handler(),
            clock,
            state: StateMachine::new(HolderState::InPool),
            usage_count: AtomicU32::new(0),
            acquisition_date: AtomicU64::new(0),
            last_release_date: AtomicU64::new(now),
            validator,
            cache,
            uncached: UncachedStatements::new(),
            enlisted: Mutex::new(Vec::new()),
            poisoned: AtomicBool::new(false),
            holder_id,
            mgmt_id,
            pool_name,
        });

        holder.registrar.register(&holder.mgmt_id);
        holder.emit_event(|handler| {
            handler.handle_connection_acquired_event(ConnectionAcquiredEvent {
                pool_name: holder.pool_name.clone(),
                holder_id: holder.holder_id,
            });
        });
        debug!(id = %holder.mgmt_id, "created pooled XA connection");
        Ok(holder)
    }

    /// Leases a logical handle on this holder.
    ///
    /// The first lease drives the holder out of the pool, validating the
    /// connection and applying the configured session settings on the way.
    /// Re-entrant leases on an accessible holder share the established
    /// session and skip both.
    pub fn get_handle(self: &Arc<Self>) -> Result<ConnectionHandle> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(Error::connection_dead(
                "holder was poisoned by an earlier requeue failure",
            ));
        }
        let old = self.state.state();
        let usage = self.usage_count.fetch_add(1, Ordering::AcqRel) + 1;
        if let Err(error) = self.lease(old, usage) {
            self.usage_count.fetch_sub(1, Ordering::AcqRel);
            return Err(error);
        }
        self.emit_event(|handler| {
            handler.handle_connection_leased_event(ConnectionLeasedEvent {
                pool_name: self.pool_name.clone(),
                holder_id: self.holder_id,
                usage_count: usage,
            });
        });
        Ok(ConnectionHandle {
            holder: Arc::clone(self),
            released: AtomicBool::new(false),
        })
    }

    fn lease(&self, old: HolderState, usage: u32) -> Result<()> {
        if usage == 1 || old == HolderState::NotAccessible {
            self.state.try_transition(HolderState::Accessible, self)?;
        }
        if old == HolderState::InPool {
            let conn = self.connection.as_ref();
            self.validator.validate(conn)?;
            apply::apply_isolation_level(conn, self.options.isolation_level.as_deref())?;
            apply::apply_cursor_holdability(conn, self.options.cursor_holdability.as_deref())?;
            apply::apply_local_auto_commit(
                conn,
                self.options.local_auto_commit.as_deref(),
                self.coordinator.current_transaction().is_some(),
            )?;
        }
        Ok(())
    }

    /// Releases one logical acquisition.
    ///
    /// Returns whether the holder went back to its pool, i.e. this was the
    /// last outstanding acquisition and requeueing was not deferred. The
    /// last release is also the one that delists the resource from the
    /// ambient transaction; partial releases of a shared holder leave the
    /// enlistment intact. A failed requeue restores the usage count: a
    /// holder that could not return to the pool remains owned by the
    /// caller.
    pub fn release(&self) -> Result<bool> {
        let previous = self
            .usage_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map_err(|_| Error::internal("release without a matching acquire"))?;
        let remaining = previous - 1;
        trace!(remaining, id = %self.mgmt_id, "releasing logical handle");

        // Other handles are still enlisted through this holder; only the
        // last release tears the resource away from its transaction.
        if remaining > 0 {
            return Ok(false);
        }

        let delist_failure = self.delist().err();

        self.emit_event(|handler| {
            handler.handle_connection_released_event(ConnectionReleasedEvent {
                pool_name: self.pool_name.clone(),
                holder_id: self.holder_id,
            });
        });

        let pool = self.pool.upgrade();

        // Deferred release: while a transaction still holds the resource
        // the connection may not return to the pool; it is parked until the
        // transaction completes or the caller re-acquires it.
        if delist_failure.is_none()
            && pool.as_ref().is_some_and(|p| p.deferred_release())
            && self.coordinator.current_transaction().is_some()
        {
            self.state.try_transition(HolderState::NotAccessible, self)?;
            return Ok(false);
        }

        let requeue_result = match pool {
            Some(pool) => pool.requeue(self),
            None => Err(Error::internal("pool no longer exists")),
        };
        if let Err(cause) = requeue_result {
            self.usage_count.fetch_add(1, Ordering::AcqRel);
            if delist_failure.is_none()
                && self.options.requeue_failure_policy == RequeueFailurePolicy::Poison
            {
                self.poisoned.store(true, Ordering::Release);
                warn!(id = %self.mgmt_id, "holder poisoned after requeue failure");
            }
            // An un-requeued holder is a leak, which outranks whatever the
            // delist reported.
            return Err(Error::requeue_failed("pool refused the holder").with_source(cause));
        }

        match delist_failure {
            Some(error) => Err(error),
            None => Ok(true),
        }
    }

    fn delist(&self) -> Result<()> {
        let Some(gtrid) = self.coordinator.current_transaction() else {
            return Ok(());
        };
        match self.coordinator.delist(self.xa_conn.xa_resource()) {
            Ok(()) => {
                self.note_delisted(&gtrid);
                Ok(())
            }
            Err(DelistError::UnilateralRollback(cause)) => {
                self.note_delisted(&gtrid);
                Err(
                    Error::unilateral_rollback(format!("transaction {gtrid} already rolled back"))
                        .with_source(Error::from_driver(cause)),
                )
            }
            Err(DelistError::System(cause)) => Err(Error::delist_failed(format!(
                "could not delist from transaction {gtrid}"
            ))
            .with_source(Error::from_driver(cause))),
        }
    }

    /// Destroys this holder: clears the statement cache, unregisters it
    /// from management and from its pool, and closes both connections.
    ///
    /// Close does not interrupt in-flight users; outstanding handles are
    /// warned about and the teardown proceeds. Both connection closes
    /// always run, logical before physical, and the first failure is
    /// reported only after the second close has had its chance.
    pub fn close(&self) -> Result<()> {
        let usage = self.usage_count();
        if usage > 0 {
            warn!(usage, id = %self.mgmt_id, "closing a holder with outstanding handles");
        }
        self.state.try_transition(HolderState::Closed, self)?;
        self.cache.clear();
        self.registrar.unregister(&self.mgmt_id);
        if let Some(pool) = self.pool.upgrade() {
            pool.unregister(self);
        }

        let logical = self.connection.close();
        let physical = self.xa_conn.close();
        self.emit_event(|handler| {
            handler.handle_connection_destroyed_event(ConnectionDestroyedEvent {
                pool_name: self.pool_name.clone(),
                holder_id: self.holder_id,
            });
        });
        debug!(id = %self.mgmt_id, "destroyed pooled XA connection");
        logical.map_err(Error::from_driver)?;
        physical.map_err(Error::from_driver)?;
        Ok(())
    }

    /// Drives this holder back to [`HolderState::InPool`].
    ///
    /// Called by the pool from inside [`PoolManager::requeue`], before the
    /// holder is exposed to other acquirers.
    pub fn mark_in_pool(&self) -> Result<()> {
        self.state
            .try_transition(HolderState::InPool, self)
            .map(|_| ())
    }

    /// Parks an accessible holder while its transaction is suspended.
    pub fn mark_not_accessible(&self) -> Result<()> {
        self.state
            .try_transition(HolderState::NotAccessible, self)
            .map(|_| ())
    }

    /// Resumes a parked holder, re-enlisting it in the caller's current
    /// transaction.
    pub fn mark_accessible(&self) -> Result<()> {
        self.state
            .try_transition(HolderState::Accessible, self)
            .map(|_| ())
    }

    /// Looks up a cached prepared statement, leaving it cached and marking
    /// it most recently used.
    pub fn get_cached(&self, key: &StatementFingerprint) -> Option<CachedStatement> {
        self.cache.get(key)
    }

    /// Caches `stmt` under `key` and returns it, evicting (and closing) the
    /// least recently used statement if the cache is at capacity.
    pub fn put_cached(&self, key: StatementFingerprint, stmt: CachedStatement) -> CachedStatement {
        self.cache.put(key, stmt)
    }

    /// Tracks a statement created outside the cache so it is force-closed
    /// if still open when the holder returns to the pool.
    pub fn register_uncached(&self, stmt: CachedStatement) -> StatementToken {
        self.uncached.insert(stmt)
    }

    /// Removes a statement from the uncached registry, handing it back for
    /// closing. Returns `None` when the holder already force-closed it.
    pub fn unregister_uncached(&self, token: &StatementToken) -> Option<CachedStatement> {
        self.uncached.remove(token)
    }

    /// Records that the transaction manager enlisted this resource in
    /// `gtrid`.
    pub fn note_enlisted(&self, gtrid: Gtrid) {
        let mut enlisted = self.enlisted.lock().unwrap();
        if !enlisted.contains(&gtrid) {
            enlisted.push(gtrid);
        }
    }

    /// Records that the transaction manager delisted this resource from
    /// `gtrid`.
    pub fn note_delisted(&self, gtrid: &Gtrid) {
        self.enlisted.lock().unwrap().retain(|g| g != gtrid);
    }

    /// The global transactions currently holding this resource.
    pub fn enlisted_gtrids(&self) -> Vec<Gtrid> {
        self.enlisted.lock().unwrap().clone()
    }

    /// The state this holder is currently in.
    pub fn state(&self) -> HolderState {
        self.state.state()
    }

    /// The number of outstanding logical acquisitions sharing this holder.
    pub fn usage_count(&self) -> u32 {
        self.usage_count.load(Ordering::Acquire)
    }

    /// Monotonic milliseconds at which the holder was last acquired from
    /// the pool.
    pub fn acquisition_date(&self) -> u64 {
        self.acquisition_date.load(Ordering::Acquire)
    }

    /// Monotonic milliseconds at which the holder last returned to the
    /// pool.
    pub fn last_release_date(&self) -> u64 {
        self.last_release_date.load(Ordering::Acquire)
    }

    /// The driver API generation selected for validation: 4, or 3 once the
    /// validity probe has failed on this connection.
    pub fn driver_api_version(&self) -> u32 {
        self.validator.api_version()
    }

    /// The management id this holder is registered under.
    pub fn management_id(&self) -> &str {
        &self.mgmt_id
    }

    /// The pool-scoped id of this holder.
    pub fn holder_id(&self) -> u64 {
        self.holder_id
    }

    /// Whether a pool may hand this holder to an additional handle inside
    /// the same global transaction.
    pub fn allows_shared_access(&self) -> bool {
        self.options.share_transaction_connections && self.state() == HolderState::Accessible
    }

    /// Emits an event through the pool's handler if one is installed.
    fn emit_event<F>(&self, emit: F)
    where
        F: FnOnce(&Arc<dyn PoolEventHandler>),
    {
        if let Some(ref handler) = self.event_handler {
            emit(handler);
        }
    }

    fn close_dangling_statements(&self) {
        let dangling = self.uncached.drain();
        if dangling.is_empty() {
            return;
        }
        debug!(
            count = dangling.len(),
            id = %self.mgmt_id,
            "force-closing dangling statements"
        );
        for stmt in dangling {
            if let Err(error) = stmt.close() {
                warn!(error = %error, "failed to force-close a dangling statement");
            }
        }
    }
}

impl TransitionListener for PooledXaConnection {
    fn before_transition(&self, old: HolderState, new: HolderState) {
        trace!(%old, %new, id = %self.mgmt_id, "holder state changing");
        if matches!(new, HolderState::InPool | HolderState::NotAccessible) {
            self.close_dangling_statements();
            if let Err(error) = self.connection.clear_warnings() {
                warn!(error = %error, "failed to clear connection warnings");
            }
        }
    }

    fn after_transition(&self, old: HolderState, new: HolderState) {
        match (old, new) {
            (_, HolderState::InPool) => {
                self.last_release_date
                    .store(self.clock.now_millis(), Ordering::Release);
            }
            (HolderState::InPool, HolderState::Accessible) => {
                self.acquisition_date
                    .store(self.clock.now_millis(), Ordering::Release);
            }
            (HolderState::NotAccessible, HolderState::Accessible) => {
                // Resuming: hand the resource back to the transaction the
                // caller is now in.
                if let Err(error) = self.coordinator.recycle(self.xa_conn.xa_resource()) {
                    error!(error = %error, id = %self.mgmt_id, "failed to re-enlist resumed holder");
                }
            }
            _ => {}
        }
    }
}

impl Drop for PooledXaConnection {
    fn drop(&mut self) {
        if self.state() != HolderState::Closed {
            // The pool normally closes holders explicitly; this is the
            // last-resort path.
            warn!(id = %self.mgmt_id, "holder dropped without being closed");
            if let Err(error) = self.close() {
                warn!(error = %error, "failed to close dropped holder");
            }
        }
    }
}

/// A logical handle leased from a holder.
///
/// Dropping the handle releases it; use
/// [`release`](ConnectionHandle::release) to observe the outcome instead.
#[derive(Debug)]
pub struct ConnectionHandle {
    holder: Arc<PooledXaConnection>,
    released: AtomicBool,
}

impl ConnectionHandle {
    /// The holder backing this handle.
    pub fn holder(&self) -> &Arc<PooledXaConnection> {
        &self.holder
    }

    /// The logical connection, for direct driver calls.
    pub fn connection(&self) -> &dyn Connection {
        self.holder.connection.as_ref()
    }

    /// Prepares a statement through the holder.
    ///
    /// With caching enabled the statement stays cached when its handle is
    /// closed; with caching disabled it is tracked in the uncached registry
    /// and closing the handle really closes it.
    pub fn prepare(&self, key: StatementFingerprint) -> Result<StatementHandle> {
        if self.holder.options.statement_cache_size > 0 {
            if let Some(stmt) = self.holder.get_cached(&key) {
                trace!(sql = %key.sql, "statement cache hit");
                return Ok(StatementHandle {
                    stmt,
                    holder: Arc::clone(&self.holder),
                    token: None,
                });
            }
            let prepared: CachedStatement = Arc::from(
                self.holder
                    .connection
                    .prepare(&key)
                    .map_err(Error::from_driver)?,
            );
            let stmt = self.holder.put_cached(key, prepared);
            Ok(StatementHandle {
                stmt,
                holder: Arc::clone(&self.holder),
                token: None,
            })
        } else {
            let prepared: CachedStatement = Arc::from(
                self.holder
                    .connection
                    .prepare(&key)
                    .map_err(Error::from_driver)?,
            );
            let token = self.holder.register_uncached(prepared.clone());
            Ok(StatementHandle {
                stmt: prepared,
                holder: Arc::clone(&self.holder),
                token: Some(token),
            })
        }
    }

    /// Releases this handle back to its holder, reporting whether the
    /// holder returned to the pool.
    pub fn release(self) -> Result<bool> {
        self.released.store(true, Ordering::Release);
        self.holder.release()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        if let Err(error) = self.holder.release() {
            warn!(error = %error, "failed to release dropped connection handle");
        }
    }
}

/// A prepared statement leased through [`ConnectionHandle::prepare`].
pub struct StatementHandle {
    stmt: CachedStatement,
    holder: Arc<PooledXaConnection>,
    token: Option<StatementToken>,
}

impl StatementHandle {
    /// The underlying prepared statement.
    pub fn statement(&self) -> &dyn Statement {
        self.stmt.as_ref()
    }

    /// Whether this statement lives in the holder's cache.
    pub fn is_cached(&self) -> bool {
        self.token.is_none()
    }

    /// Closes the handle. Cached statements stay cached and re-issuable;
    /// uncached ones are removed from the registry and closed for real.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        if let Some(stmt) = self.holder.unregister_uncached(&token) {
            stmt.close().map_err(Error::from_driver)?;
        }
        Ok(())
    }
}

impl Drop for StatementHandle {
    fn drop(&mut self) {
        if let Err(error) = self.close_inner() {
            warn!(error = %error, "failed to close statement handle");
        }
    }
}
