//! Application of configured session settings, and the constant
//! dictionaries they translate through.
//!
//! Unknown configuration values are never fatal: the warning is logged and
//! the driver default stays in effect. Errors from the driver itself do
//! propagate.

use tracing::{debug, warn};

use crate::{
    driver::Connection,
    error::{Error, Result},
};

/// No transaction isolation.
pub const TRANSACTION_NONE: i32 = 0;
/// Dirty reads, non-repeatable reads and phantom reads can occur.
pub const TRANSACTION_READ_UNCOMMITTED: i32 = 1;
/// Dirty reads are prevented.
pub const TRANSACTION_READ_COMMITTED: i32 = 2;
/// Dirty reads and non-repeatable reads are prevented.
pub const TRANSACTION_REPEATABLE_READ: i32 = 4;
/// Dirty reads, non-repeatable reads and phantom reads are prevented.
pub const TRANSACTION_SERIALIZABLE: i32 = 8;

/// Cursors stay open across commit.
pub const HOLD_CURSORS_OVER_COMMIT: i32 = 1;
/// Cursors are closed at commit.
pub const CLOSE_CURSORS_AT_COMMIT: i32 = 2;

/// Translates a symbolic isolation level to its integer constant.
pub fn isolation_code(name: &str) -> Option<i32> {
    match name {
        "NONE" => Some(TRANSACTION_NONE),
        "READ_UNCOMMITTED" => Some(TRANSACTION_READ_UNCOMMITTED),
        "READ_COMMITTED" => Some(TRANSACTION_READ_COMMITTED),
        "REPEATABLE_READ" => Some(TRANSACTION_REPEATABLE_READ),
        "SERIALIZABLE" => Some(TRANSACTION_SERIALIZABLE),
        _ => None,
    }
}

/// Names an isolation constant, for diagnostics.
pub fn isolation_name(code: i32) -> Option<&'static str> {
    match code {
        TRANSACTION_NONE => Some("NONE"),
        TRANSACTION_READ_UNCOMMITTED => Some("READ_UNCOMMITTED"),
        TRANSACTION_READ_COMMITTED => Some("READ_COMMITTED"),
        TRANSACTION_REPEATABLE_READ => Some("REPEATABLE_READ"),
        TRANSACTION_SERIALIZABLE => Some("SERIALIZABLE"),
        _ => None,
    }
}

/// Translates a symbolic cursor holdability to its integer constant.
pub fn holdability_code(name: &str) -> Option<i32> {
    match name {
        "HOLD_CURSORS_OVER_COMMIT" => Some(HOLD_CURSORS_OVER_COMMIT),
        "CLOSE_CURSORS_AT_COMMIT" => Some(CLOSE_CURSORS_AT_COMMIT),
        _ => None,
    }
}

/// Names a holdability constant, for diagnostics.
pub fn holdability_name(code: i32) -> Option<&'static str> {
    match code {
        HOLD_CURSORS_OVER_COMMIT => Some("HOLD_CURSORS_OVER_COMMIT"),
        CLOSE_CURSORS_AT_COMMIT => Some("CLOSE_CURSORS_AT_COMMIT"),
        _ => None,
    }
}

/// Applies the configured isolation level. Symbolic names are translated;
/// anything else is tried as a numeric constant.
pub(crate) fn apply_isolation_level(conn: &dyn Connection, configured: Option<&str>) -> Result<()> {
    let Some(value) = configured else {
        return Ok(());
    };
    let code = match isolation_code(value) {
        Some(code) => code,
        None => match value.parse::<i32>() {
            Ok(code) => code,
            Err(_) => {
                warn!(value, "unknown isolation level; keeping the driver default");
                return Ok(());
            }
        },
    };
    conn.set_transaction_isolation(code)
        .map_err(Error::from_driver)?;
    debug!(
        code,
        name = isolation_name(code).unwrap_or("<numeric>"),
        "applied isolation level"
    );
    Ok(())
}

/// Applies the configured cursor holdability. Only symbolic names are
/// accepted.
pub(crate) fn apply_cursor_holdability(
    conn: &dyn Connection,
    configured: Option<&str>,
) -> Result<()> {
    let Some(value) = configured else {
        return Ok(());
    };
    match holdability_code(value) {
        Some(code) => {
            conn.set_holdability(code).map_err(Error::from_driver)?;
            debug!(code, name = value, "applied cursor holdability");
            Ok(())
        }
        None => {
            warn!(value, "unknown cursor holdability; keeping the driver default");
            Ok(())
        }
    }
}

/// Applies the configured auto-commit mode. Auto-commit is meaningless on a
/// connection enlisted in a global transaction, so nothing is applied while
/// one is ambient.
pub(crate) fn apply_local_auto_commit(
    conn: &dyn Connection,
    configured: Option<&str>,
    transaction_ambient: bool,
) -> Result<()> {
    let Some(value) = configured else {
        return Ok(());
    };
    if transaction_ambient {
        debug!("transaction ambient; leaving auto-commit untouched");
        return Ok(());
    }
    let auto_commit = if value.eq_ignore_ascii_case("true") {
        true
    } else if value.eq_ignore_ascii_case("false") {
        false
    } else {
        warn!(value, "unparsable local auto-commit; keeping the driver default");
        return Ok(());
    };
    conn.set_auto_commit(auto_commit).map_err(Error::from_driver)?;
    debug!(auto_commit, "applied local auto-commit");
    Ok(())
}
