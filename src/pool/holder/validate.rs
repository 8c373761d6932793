use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use tracing::{debug, warn};

use crate::{
    driver::{Connection, DriverResult},
    error::{Error, Result},
    pool::{holder::cache::StatementFingerprint, PoolOptions},
};

/// First driver API generation carrying the native validity probe.
pub(crate) const PROBE_API_VERSION: u32 = 4;

/// Probes a connection's liveness on its way out of the pool.
///
/// The native probe is preferred when the driver advertises it. Some
/// vendors advertise the probe and then throw on it; a probe that itself
/// errors permanently downgrades this connection to the query path.
#[derive(Debug)]
pub(crate) struct ConnectionValidator {
    api_version: AtomicU32,
    probe_enabled: bool,
    test_timeout: Duration,
    test_query: Option<String>,
}

impl ConnectionValidator {
    pub(crate) fn new(api_version: u32, options: &PoolOptions) -> Self {
        Self {
            api_version: AtomicU32::new(api_version),
            probe_enabled: options.enable_validity_probe,
            test_timeout: options.connection_test_timeout,
            test_query: options.test_query.clone(),
        }
    }

    /// The driver API generation currently selected for this connection.
    pub(crate) fn api_version(&self) -> u32 {
        self.api_version.load(Ordering::Acquire)
    }

    pub(crate) fn validate(&self, conn: &dyn Connection) -> Result<()> {
        if self.probe_enabled && self.api_version() >= PROBE_API_VERSION {
            match conn.is_valid(self.test_timeout) {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    return Err(Error::connection_dead(
                        "native validity probe reported the connection dead",
                    ));
                }
                Err(error) => {
                    // The probe itself failed, not the connection; never try
                    // it again on this connection.
                    self.api_version
                        .store(PROBE_API_VERSION - 1, Ordering::Release);
                    warn!(
                        error = %error,
                        "validity probe failed; falling back to the test query"
                    );
                }
            }
        }

        match self.test_query.as_deref() {
            Some(query) => self.run_test_query(conn, query).map_err(|error| {
                Error::connection_dead(format!("test query {query:?} failed"))
                    .with_source(Error::from_driver(error))
            }),
            None => {
                debug!("no test query configured; skipping query validation");
                Ok(())
            }
        }
    }

    fn run_test_query(&self, conn: &dyn Connection, query: &str) -> DriverResult<()> {
        let stmt = conn.prepare(&StatementFingerprint::from_sql(query))?;
        let outcome = (|| {
            stmt.set_query_timeout(self.test_timeout)?;
            let mut rows = stmt.execute()?;
            rows.close()
        })();
        let closed = stmt.close();
        outcome?;
        closed
    }
}
