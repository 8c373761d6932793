#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub(crate) mod clock;
pub mod driver;
pub mod error;
pub mod event;
pub mod mgmt;
pub mod pool;
pub mod tx;

pub use crate::{
    error::{Error, ErrorKind, Result},
    pool::{
        holder::{
            cache::{CachedStatement, StatementFingerprint},
            registry::StatementToken,
            state::HolderState,
            ConnectionHandle, PooledXaConnection, StatementHandle,
        },
        CommitOrdering, PoolManager, PoolOptions, RequeueFailurePolicy,
    },
    tx::Gtrid,
};
