//! Contains the `Error` and `Result` types that `xapool` uses.

use std::sync::Arc;

use thiserror::Error;

use crate::{driver::DriverError, pool::holder::state::HolderState};

/// The result type for all methods that can return an error in the `xapool`
/// crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in the `xapool` crate. The inner [`ErrorKind`] is
/// boxed to keep the type small on the happy path; causes are chained
/// through `source`.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,
    #[source]
    pub(crate) source: Option<Box<Error>>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            source: None,
        }
    }

    /// Chains `source` as the cause of this error.
    pub(crate) fn with_source(mut self, source: Error) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Wraps an error reported by the vendor driver.
    pub(crate) fn from_driver(error: DriverError) -> Self {
        Self::new(ErrorKind::Driver(Arc::from(error)))
    }

    pub(crate) fn connection_dead(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionDead {
            message: message.into(),
        })
    }

    pub(crate) fn unilateral_rollback(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnilateralRollback {
            message: message.into(),
        })
    }

    pub(crate) fn delist_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DelistFailed {
            message: message.into(),
        })
    }

    pub(crate) fn requeue_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequeueFailed {
            message: message.into(),
        })
    }

    pub(crate) fn invalid_transition(from: HolderState, to: HolderState) -> Self {
        Self::new(ErrorKind::InvalidTransition { from, to })
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal {
            message: message.into(),
        })
    }

    /// Whether the validator declared the physical connection unusable.
    pub fn is_connection_dead(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::ConnectionDead { .. })
    }

    /// Whether the enclosing transaction was already rolled back when the
    /// resource was delisted.
    pub fn is_unilateral_rollback(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::UnilateralRollback { .. })
    }

    /// Whether delisting failed for a reason other than rollback.
    pub fn is_delist_failed(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::DelistFailed { .. })
    }

    /// Whether the pool rejected the holder at requeue time.
    pub fn is_requeue_failed(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::RequeueFailed { .. })
    }

    /// Whether a holder state transition was rejected.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::InvalidTransition { .. })
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// The types of errors that can occur.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The validator determined the physical connection is unusable; the
    /// caller must discard it and acquire a fresh holder.
    #[error("connection failed liveness validation: {message}")]
    ConnectionDead {
        /// A description of the validation failure.
        message: String,
    },

    /// The transaction manager had already rolled back the enclosing
    /// transaction when the resource was delisted. Callers must treat the
    /// transaction as rolled back.
    #[error("transaction was rolled back unilaterally during delist: {message}")]
    UnilateralRollback {
        /// A description of the rollback report.
        message: String,
    },

    /// Delisting the resource from its transaction failed.
    #[error("failed to delist resource from its transaction: {message}")]
    DelistFailed {
        /// A description of the delist failure.
        message: String,
    },

    /// The pool rejected the holder at requeue time. The holder's usage
    /// count has been restored; it remains owned by the caller.
    #[error("pool rejected the holder on requeue: {message}")]
    RequeueFailed {
        /// A description of the requeue failure.
        message: String,
    },

    /// A holder state transition was requested that the state machine does
    /// not permit. This is a programming error.
    #[error("invalid holder state transition: {from} -> {to}")]
    InvalidTransition {
        /// The state the holder was in.
        from: HolderState,
        /// The state that was requested.
        to: HolderState,
    },

    /// An error reported by the vendor driver.
    #[error("driver error: {0}")]
    Driver(Arc<dyn std::error::Error + Send + Sync>),

    /// An unexpected internal condition.
    #[error("internal error: {message}")]
    Internal {
        /// A description of the condition.
        message: String,
    },
}
