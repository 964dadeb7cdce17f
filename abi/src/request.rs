//! Data requests and the pull/push scheduling split (§3, §4.2.2).

use crate::ids::{DataId, Period};

/// `{ id, period_ns }` — one line of a consumer's subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRequest {
    pub id: DataId,
    pub period: Period,
}

impl DataRequest {
    pub const fn new(id: DataId, period: Period) -> Self {
        Self { id, period }
    }
}

/// Ordered sequence of data requests forming one consumer's subscription.
pub type RequestList = Vec<DataRequest>;

/// A driver exposes exactly one of `parse` (pull) or `poll` (push); this is
/// its `sched_mode`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedMode {
    /// The core drives sampling via periodic `ops.next` calls and decodes
    /// bytes itself via `ops.parse`.
    Pull,
    /// The driver drives sampling and pushes records whenever it chooses,
    /// via `ops.poll`.
    Push,
}
