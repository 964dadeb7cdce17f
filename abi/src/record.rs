//! Records and record envelopes (§3).

use std::sync::Arc;

use crate::ids::{DataId, DeviceId};

/// One timestamped, schema-typed payload emitted by a driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub data_id: DataId,
    pub dev_id: DeviceId,
    pub seqno: u64,
    /// Wall-clock timestamp as `(seconds, nanoseconds)`.
    pub timestamp: (i64, u32),
    pub size: u32,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(
        data_id: DataId,
        dev_id: DeviceId,
        seqno: u64,
        timestamp: (i64, u32),
        data: Vec<u8>,
    ) -> Self {
        let size = data.len() as u32;
        Self {
            data_id,
            dev_id,
            seqno,
            timestamp,
            size,
            data,
        }
    }
}

/// Record plus an atomic reference count, shared by every queue holding it.
///
/// This crate runs hosted, so "record plus atomic refcount, freed when it
/// hits zero" is simply [`Arc`] — `Arc::strong_count` is exactly the
/// refcount §8's testable properties describe, and drop already performs
/// the release-on-zero exactly once.
pub type RecordEnvelope = Arc<Record>;

/// Number of live references to this envelope (queues holding it plus
/// in-flight callback dispatchers), for tests and diagnostics.
pub fn envelope_refcount(env: &RecordEnvelope) -> usize {
    Arc::strong_count(env)
}
