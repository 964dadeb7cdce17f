//! The public library facade (§6): a `Broker` wiring the driver registry,
//! I/O poller, and built-in drivers together behind the handful of calls an
//! embedder actually needs, plus the `Context` handle `alloc_ctx` hands back.
//!
//! A library entry point rather than a boot entry point, since a sensor
//! broker has no boot process to own — it just wires the registry, the
//! poller, and the built-in drivers together once, behind a handle an
//! embedder can clone and pass around freely.

pub mod config;

use std::sync::Arc;

pub use hound_abi::{
    DataDescriptor, DataId, DataRequest, DeviceId, Error, FieldDescriptor, FieldType, InitArg,
    InitArgs, Period, Record, RecordEnvelope, Result, SchedMode, Unit,
};
pub use hound_core::{Context, SchemaSource};

use hound_core::{DriverRegistry, Poller};

/// The process-wide broker: driver registry plus the poller it drives.
/// Construct one per embedding process; `Arc<Broker>` clones cheaply and
/// every handle it hands out (`Arc<Context>`) keeps its registry alive.
pub struct Broker {
    registry: Arc<DriverRegistry>,
}

impl Broker {
    /// Build a broker backed by `schema_source` and register every built-in
    /// driver kind (§10: `hound-drivers`) under its op-table name.
    pub fn new(schema_source: Arc<dyn SchemaSource>) -> Arc<Self> {
        hound_lib::logging::init();
        let poller = Poller::new();
        let registry = Arc::new(DriverRegistry::new(poller, schema_source));
        hound_drivers::register_factories(&registry);
        Arc::new(Self { registry })
    }

    /// Register a driver kind's factory under `name`, alongside the
    /// built-ins [`Broker::new`] already registered. Lets an embedder (or a
    /// test) add a driver kind `hound-drivers` doesn't ship.
    pub fn register_ops(&self, name: &str, factory: Arc<dyn hound_core::DriverFactory>) {
        self.registry.register_ops(name, factory);
    }

    /// `init_driver(name, path, schema_base, schema, args)` (§6).
    pub fn init_driver(
        &self,
        name: &str,
        path: &str,
        schema_base: &str,
        schema_file: &str,
        args: &InitArgs,
    ) -> Result<()> {
        self.registry
            .register_driver(name, path, schema_base, schema_file, args)
    }

    pub fn destroy_driver(&self, path: &str) -> Result<()> {
        self.registry.destroy_driver(path)
    }

    pub fn destroy_all_drivers(&self) {
        self.registry.destroy_all_drivers()
    }

    /// `get_dev_name(dev_id) -> string` (§6).
    pub fn get_dev_name(&self, dev_id: DeviceId) -> Option<String> {
        self.registry.dev_name(dev_id)
    }

    /// `get_datadesc() -> Vec<DataDescriptor>` (§6): every enabled descriptor
    /// across every registered driver instance.
    pub fn get_datadesc(&self) -> Vec<DataDescriptor> {
        self.registry.all_descriptors()
    }

    /// `alloc_ctx(rq) -> Context` (§6). The returned handle is inactive
    /// until [`Context::start`]; `start`/`stop`/`modify`/`read*`/`next`/
    /// `free` are inherent methods on the handle itself (§4.4), not on the
    /// broker, since a context outlives no particular call into it.
    pub fn alloc_ctx(
        &self,
        queue_len: usize,
        requests: &[DataRequest],
        callback: Arc<dyn Fn(&Record, u64) + Send + Sync>,
    ) -> Result<Arc<Context>> {
        Context::alloc(self.registry.clone(), queue_len, requests, Some(callback))
    }
}

/// `strerror(err)` (§6): maps an error kind to a human string, falling back
/// to the OS table for passed-through positive errno values.
pub fn strerror(err: &Error) -> String {
    err.strerror()
}
