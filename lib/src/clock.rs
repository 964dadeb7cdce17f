//! Monotonic clock and wall-clock timestamp helpers.
//!
//! The nanosecond-resolution monotonic clock is `std::time::Instant`. The
//! poller (§4.3) uses [`monotonic_ns`] for pull-timer bookkeeping; records
//! use [`wall_clock_timestamp`] for their `(sec, nsec)` field.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic clock value in nanoseconds since an arbitrary but fixed
/// process-local epoch. Only differences between two calls are meaningful.
#[inline]
pub fn monotonic_ns() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Wall-clock timestamp as `(seconds, nanoseconds)` since the Unix epoch,
/// matching the `Record::timestamp` field.
pub fn wall_clock_timestamp() -> (i64, u32) {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(_) => (0, 0),
    }
}
