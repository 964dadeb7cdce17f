//! The broker core: driver ABI, driver registry, I/O poller, and consumer
//! contexts (§4 of the design). Everything a concrete driver or the public
//! facade needs sits behind this crate; schema-file parsing is deliberately
//! left to a [`schema_source::SchemaSource`] implementation supplied by the
//! caller, matching §1's "schema files are not this crate's concern".

pub mod context;
pub mod driver;
pub mod poller;
pub mod registry;
pub mod schema_source;

pub use context::Context;
pub use driver::{
    current_driver, ActiveRequest, CurrentDriverGuard, Driver, DriverFactory, DriverImpl,
    ParseOutcome, PullDriver, PushDriver, PushSink,
};
pub use poller::{Poller, PollerGuard};
pub use registry::{DriverInstance, DriverRegistry};
pub use schema_source::SchemaSource;
