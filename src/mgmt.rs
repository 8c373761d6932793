//! Registration of holders with an operational-management facility.

/// Receives holder registrations so operators can inspect live holders.
///
/// The registrar is injected into each holder rather than consulted through
/// process-wide state; the enclosing transaction manager wires its own
/// implementation in.
pub trait ManagementRegistrar: Send + Sync {
    /// Registers `id`.
    fn register(&self, id: &str);

    /// Removes a previous registration of `id`.
    fn unregister(&self, id: &str);
}

/// A registrar that ignores all registrations.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopManagementRegistrar;

impl ManagementRegistrar for NoopManagementRegistrar {
    fn register(&self, _id: &str) {}

    fn unregister(&self, _id: &str) {}
}

const MGMT_TAG: &str = "xapool.holder";

/// Mints the stable management id a holder is registered under.
pub(crate) fn management_id(pool_name: &str, holder_id: u64) -> String {
    format!("{}:{}:{}", MGMT_TAG, sanitize(pool_name), holder_id)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
