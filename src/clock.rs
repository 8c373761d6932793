use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A millisecond clock that never goes backwards.
///
/// Wall time is read once at construction; from then on the value advances
/// with the process monotonic clock, so wall-clock adjustments cannot
/// reorder the holder's observability timestamps. Not suitable for timeouts
/// or for ordering XA events.
#[derive(Clone, Debug)]
pub(crate) struct MonotonicClock {
    wall_anchor: u64,
    origin: Instant,
}

impl MonotonicClock {
    pub(crate) fn new() -> Self {
        let wall_anchor = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        Self {
            wall_anchor,
            origin: Instant::now(),
        }
    }

    /// Milliseconds since the Unix epoch as observed at construction, plus
    /// monotonic time elapsed since.
    pub(crate) fn now_millis(&self) -> u64 {
        self.wall_anchor + self.origin.elapsed().as_millis() as u64
    }
}
