//! Hound kernel/userland-adjacent ABI types.
//!
//! This crate provides the canonical definitions shared between the broker
//! core, the concrete drivers, and the public facade crate. Having a single
//! source of truth eliminates duplicate type definitions and keeps the
//! driver ABI (§6 of the design) stable independent of the core's internal
//! representation.

pub mod error;
pub mod ids;
pub mod init_arg;
pub mod record;
pub mod request;
pub mod schema;

pub use error::{Error, Result};
pub use ids::{DataId, DeviceId, Period};
pub use init_arg::{InitArg, InitArgs};
pub use record::{Record, RecordEnvelope};
pub use request::{DataRequest, RequestList, SchedMode};
pub use schema::{DataDescriptor, FieldDescriptor, FieldType, SchemaDescriptor, Unit};

/// Upper bound on the number of data requests a single context may hold at
/// once (§4.4 `alloc` validation).
pub const MAX_REQUESTS: usize = 64;
