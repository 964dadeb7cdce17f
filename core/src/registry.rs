//! The driver registry (§4.2): name→ops, path→instance, data-ID→instance
//! maps guarded by a reader/writer lock, plus active-data aggregation
//! (§4.2.1).
//!
//! A `std::sync::RwLock`-guarded table of boxed trait objects. Each driver
//! instance additionally gets its own `Mutex` for `active_data`/`refcount`/
//! `fd` (§5 "shared-resource policy"), so data-plane operations don't
//! contend on the registry-wide lock.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex, RwLock};

use hound_abi::{
    DataDescriptor, DataId, DataRequest, DeviceId, Error, InitArgs, Period, Result, SchedMode,
};
use log::{error, info, warn};

use crate::driver::{ActiveRequest, CurrentDriverGuard, Driver, DriverFactory, DriverImpl};
use crate::poller::Poller;
use crate::schema_source::SchemaSource;
use hound_lib::Queue;

/// One activated driver. Created by `register_driver`, destroyed once its
/// refcount returns to zero and the caller asks for it.
pub struct DriverInstance {
    pub path: String,
    pub dev_id: DeviceId,
    pub driver: Arc<DriverImpl>,
    state: Mutex<InstanceState>,
}

struct InstanceState {
    descriptors: Vec<DataDescriptor>,
    active_data: Vec<ActiveRequest>,
    refcount: u32,
    fd: Option<RawFd>,
}

impl DriverInstance {
    pub fn descriptors(&self) -> Vec<DataDescriptor> {
        self.state.lock().unwrap().descriptors.clone()
    }

    pub fn refcount(&self) -> u32 {
        self.state.lock().unwrap().refcount
    }
}

struct RegistryInner {
    ops: HashMap<String, Arc<dyn DriverFactory>>,
    instances: HashMap<String, Arc<DriverInstance>>,
    claims: HashMap<DataId, String>,
}

/// The three process-wide maps (§4.2), plus the poller they coordinate
/// with under the pause protocol.
pub struct DriverRegistry {
    inner: RwLock<RegistryInner>,
    poller: Arc<Poller>,
    schema_source: Arc<dyn SchemaSource>,
    next_dev_id: Mutex<u64>,
}

impl DriverRegistry {
    pub fn new(poller: Arc<Poller>, schema_source: Arc<dyn SchemaSource>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                ops: HashMap::new(),
                instances: HashMap::new(),
                claims: HashMap::new(),
            }),
            poller,
            schema_source,
            next_dev_id: Mutex::new(0),
        }
    }

    /// Register a driver-kind's factory under `name` (§4.2: "populated by
    /// module constructors").
    pub fn register_ops(&self, name: &str, factory: Arc<dyn DriverFactory>) {
        self.inner
            .write()
            .unwrap()
            .ops
            .insert(name.to_string(), factory);
    }

    fn alloc_dev_id(&self) -> DeviceId {
        let mut next = self.next_dev_id.lock().unwrap();
        let id = DeviceId::new(*next);
        *next += 1;
        id
    }

    /// §4.2 `register_driver`.
    pub fn register_driver(
        &self,
        name: &str,
        path: &str,
        schema_base: &str,
        schema_file: &str,
        args: &InitArgs,
    ) -> Result<()> {
        let factory = {
            let inner = self.inner.read().unwrap();
            if inner.instances.contains_key(path) {
                return Err(Error::DriverAlreadyPresent);
            }
            inner
                .ops
                .get(name)
                .cloned()
                .ok_or(Error::DriverNotRegistered)?
        };

        let driver_impl = factory.init(path, args)?;
        let driver = driver_impl.as_driver();

        let device_name = driver.device_name();
        if device_name.is_empty() || device_name.len() > 255 {
            driver.destroy();
            return Err(Error::InvalidString);
        }

        let schemas = match self.schema_source.load(schema_base, schema_file) {
            Ok(s) => s,
            Err(e) => {
                driver.destroy();
                return Err(e);
            }
        };

        let dev_id = self.alloc_dev_id();
        let mut descriptors = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let schema = match schema.finalize() {
                Ok(s) => s,
                Err(e) => {
                    driver.destroy();
                    return Err(e);
                }
            };
            descriptors.push(DataDescriptor {
                data_id: schema.data_id,
                dev_id,
                name: schema.name,
                fmts: schema.fmts,
                avail_periods: Vec::new(),
                enabled: false,
            });
        }

        driver.datadesc(&mut descriptors);

        {
            let inner = self.inner.read().unwrap();
            for d in descriptors.iter().filter(|d| d.enabled) {
                if inner.claims.contains_key(&d.data_id) {
                    drop(inner);
                    driver.destroy();
                    return Err(Error::ConflictingDrivers);
                }
            }
        }
        if !descriptors.iter().any(|d| d.enabled) {
            driver.destroy();
            return Err(Error::NoDescsEnabled);
        }

        let instance = Arc::new(DriverInstance {
            path: path.to_string(),
            dev_id,
            driver: Arc::new(driver_impl),
            state: Mutex::new(InstanceState {
                descriptors,
                active_data: Vec::new(),
                refcount: 0,
                fd: None,
            }),
        });

        let mut inner = self.inner.write().unwrap();
        for d in instance.state.lock().unwrap().descriptors.iter().filter(|d| d.enabled) {
            inner.claims.insert(d.data_id, path.to_string());
        }
        inner.instances.insert(path.to_string(), instance);
        info!("hound: driver '{name}' registered at {path} (dev_id={})", dev_id.get());
        Ok(())
    }

    /// §4.2 `destroy(path)`.
    pub fn destroy_driver(&self, path: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let instance = inner
            .instances
            .get(path)
            .cloned()
            .ok_or(Error::DevDoesNotExist)?;
        if instance.refcount() != 0 {
            return Err(Error::DriverInUse);
        }
        inner.instances.remove(path);
        inner.claims.retain(|_, p| p != path);
        drop(inner);
        instance.driver.as_driver().destroy();
        info!("hound: driver at {path} destroyed");
        Ok(())
    }

    pub fn destroy_all_drivers(&self) {
        let paths: Vec<String> = self
            .inner
            .read()
            .unwrap()
            .instances
            .keys()
            .cloned()
            .collect();
        for path in paths {
            if let Err(e) = self.destroy_driver(&path) {
                warn!("hound: failed to destroy driver at {path} during shutdown: {e}");
            }
        }
    }

    pub fn lookup_by_path(&self, path: &str) -> Option<Arc<DriverInstance>> {
        self.inner.read().unwrap().instances.get(path).cloned()
    }

    pub fn lookup_by_data_id(&self, id: DataId) -> Option<Arc<DriverInstance>> {
        let inner = self.inner.read().unwrap();
        let path = inner.claims.get(&id)?;
        inner.instances.get(path).cloned()
    }

    pub fn dev_name(&self, dev_id: DeviceId) -> Option<String> {
        let inner = self.inner.read().unwrap();
        inner
            .instances
            .values()
            .find(|i| i.dev_id == dev_id)
            .map(|i| i.driver.as_driver().device_name())
    }

    pub fn all_descriptors(&self) -> Vec<DataDescriptor> {
        let inner = self.inner.read().unwrap();
        inner
            .instances
            .values()
            .flat_map(|i| i.descriptors())
            .filter(|d| d.enabled)
            .collect()
    }

    pub fn period_supported(&self, id: DataId, period_ns: u64) -> bool {
        self.lookup_by_data_id(id)
            .and_then(|inst| {
                inst.descriptors()
                    .into_iter()
                    .find(|d| d.data_id == id)
                    .map(|d| d.period_supported(period_ns))
            })
            .unwrap_or(false)
    }

    /// §4.2.1 `ref(drv, queue, requests[])`.
    pub fn ref_driver(
        &self,
        instance: &Arc<DriverInstance>,
        queue: &Arc<Queue>,
        requests: &[DataRequest],
    ) -> Result<()> {
        // §5 "timeout semantics": a pull-mode driver has no timer-free way to
        // service an on-demand request, so the binding path rejects it here
        // too — must agree with `Context`'s own check (§4.4) so neither path
        // can bind what the other would have refused.
        if instance.driver.mode() == SchedMode::Pull && requests.iter().any(|r| r.period.is_on_demand()) {
            return Err(Error::PeriodUnsupported);
        }
        let driver = instance.driver.as_driver();
        let (changed, was_first_ref, active_snapshot) = {
            let mut state = instance.state.lock().unwrap();
            let mut changed = false;
            for req in requests {
                match state
                    .active_data
                    .iter_mut()
                    .find(|a| a.id == req.id && a.period == req.period)
                {
                    Some(existing) => existing.refcount += 1,
                    None => {
                        state.active_data.push(ActiveRequest {
                            id: req.id,
                            period: req.period,
                            refcount: 1,
                        });
                        changed = true;
                    }
                }
            }
            let was_first_ref = state.refcount == 0;
            state.refcount += 1;
            (changed, was_first_ref, state.active_data.clone())
        };

        if changed {
            let _guard = CurrentDriverGuard::enter(&instance.path);
            driver.setdata(&active_snapshot);
        }

        let mut pause = self.poller.pause();
        let result = (|| -> Result<()> {
            let fd = if was_first_ref {
                let fd = driver.start().map_err(|e| {
                    error!("hound: driver at {} failed to start: {e}", instance.path);
                    e
                })?;
                self.poller
                    .register_fd(&mut pause, fd, instance.driver.clone(), instance.dev_id);
                instance.state.lock().unwrap().fd = Some(fd);
                fd
            } else {
                instance
                    .state
                    .lock()
                    .unwrap()
                    .fd
                    .ok_or(Error::DriverFail)?
            };
            let ids: Vec<DataId> = requests.iter().map(|r| r.id).collect();
            let periods: Vec<(DataId, Period)> =
                requests.iter().map(|r| (r.id, r.period)).collect();
            self.poller
                .bind_queue(&mut pause, fd, queue.clone(), ids, &periods);
            Ok(())
        })();
        drop(pause);

        if let Err(e) = result {
            self.rollback_ref(instance, requests, was_first_ref);
            return Err(e);
        }
        Ok(())
    }

    fn rollback_ref(&self, instance: &Arc<DriverInstance>, requests: &[DataRequest], was_first_ref: bool) {
        let mut state = instance.state.lock().unwrap();
        state.refcount = state.refcount.saturating_sub(1);
        for req in requests {
            if let Some(pos) = state
                .active_data
                .iter()
                .position(|a| a.id == req.id && a.period == req.period)
            {
                state.active_data[pos].refcount -= 1;
                if state.active_data[pos].refcount == 0 {
                    state.active_data.remove(pos);
                }
            }
        }
        if was_first_ref {
            state.fd = None;
        }
        warn!("hound: rolled back failed ref() on driver at {}", instance.path);
    }

    /// §4.2.1 `unref(drv, queue, requests[])`.
    pub fn unref_driver(
        &self,
        instance: &Arc<DriverInstance>,
        queue: &Arc<Queue>,
        requests: &[DataRequest],
    ) -> Result<()> {
        let driver = instance.driver.as_driver();
        let (changed, becomes_idle, active_snapshot, fd) = {
            let mut state = instance.state.lock().unwrap();
            let mut changed = false;
            for req in requests {
                if let Some(pos) = state
                    .active_data
                    .iter()
                    .position(|a| a.id == req.id && a.period == req.period)
                {
                    state.active_data[pos].refcount -= 1;
                    if state.active_data[pos].refcount == 0 {
                        state.active_data.remove(pos);
                        changed = true;
                    }
                }
            }
            state.refcount = state.refcount.saturating_sub(1);
            (state.refcount == 0, state.refcount == 0, state.active_data.clone(), state.fd)
        };

        let mut pause = self.poller.pause();
        if let Some(fd) = fd {
            let still_active: Vec<DataId> = active_snapshot.iter().map(|a| a.id).collect();
            self.poller.unbind_queue(&mut pause, fd, queue, &still_active);
            if becomes_idle {
                self.poller.unregister_fd(&mut pause, fd);
            }
        }
        drop(pause);

        if becomes_idle {
            driver.stop();
            instance.state.lock().unwrap().fd = None;
        } else if changed {
            let _guard = CurrentDriverGuard::enter(&instance.path);
            driver.setdata(&active_snapshot);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
