//! The interface this crate consumes from the transaction manager.
//!
//! Enlistment, two-phase commit and recovery live in the enclosing
//! transaction manager; holders only need the narrow surface defined here.

use std::fmt;

use crate::driver::{DriverError, XaResource};

/// A global transaction identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Gtrid(Vec<u8>);

impl Gtrid {
    /// Wraps raw global transaction id bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw id bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Gtrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Gtrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gtrid({})", hex::encode(&self.0))
    }
}

/// Why a delist attempt failed.
#[derive(Debug)]
#[non_exhaustive]
pub enum DelistError {
    /// The transaction manager had already rolled the transaction back.
    UnilateralRollback(DriverError),

    /// Any other transaction-manager failure.
    System(DriverError),
}

/// The transaction-manager surface a holder drives.
pub trait TransactionCoordinator: Send + Sync {
    /// The transaction ambient on the calling thread, if any.
    fn current_transaction(&self) -> Option<Gtrid>;

    /// Delists `resource` from the ambient transaction.
    fn delist(&self, resource: &dyn XaResource) -> std::result::Result<(), DelistError>;

    /// Re-enlists `resource` in the ambient transaction after a suspension.
    fn recycle(&self, resource: &dyn XaResource) -> std::result::Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::Gtrid;

    #[test]
    fn gtrid_displays_as_hex() {
        let gtrid = Gtrid::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(gtrid.to_string(), "deadbeef");
        assert_eq!(format!("{gtrid:?}"), "Gtrid(deadbeef)");
    }
}
