use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use hound_abi::{DataDescriptor, DataId, Error, FieldDescriptor, FieldType, InitArgs, Result, SchemaDescriptor, Unit};

use super::*;
use crate::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, ParseOutcome, PullDriver};
use crate::schema_source::SchemaSource;

struct NopDriver {
    started: AtomicBool,
    stopped: AtomicU32,
    fds: Mutex<(RawFd, RawFd)>,
}

impl Driver for NopDriver {
    fn device_name(&self) -> String {
        "nop".to_string()
    }

    fn datadesc(&self, descs: &mut Vec<DataDescriptor>) {
        for d in descs.iter_mut() {
            d.enabled = true;
        }
    }

    fn setdata(&self, _active: &[ActiveRequest]) {}

    fn start(&self) -> Result<RawFd> {
        self.started.store(true, Ordering::SeqCst);
        let fds = self.fds.lock().unwrap();
        Ok(fds.0)
    }

    fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn next(&self, _id: DataId) {}
}

impl PullDriver for NopDriver {
    fn parse(&self, buf: &[u8]) -> ParseOutcome {
        ParseOutcome {
            bytes_left: buf.len(),
            records: Vec::new(),
        }
    }
}

struct NopFactory;

impl DriverFactory for NopFactory {
    fn init(&self, _path: &str, _args: &InitArgs) -> Result<DriverImpl> {
        let mut fds = [0 as RawFd; 2];
        unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK) };
        Ok(DriverImpl::Pull(Box::new(NopDriver {
            started: AtomicBool::new(false),
            stopped: AtomicU32::new(0),
            fds: Mutex::new((fds[0], fds[1])),
        })))
    }
}

struct StaticSchema;

impl SchemaSource for StaticSchema {
    fn load(&self, _base: &str, _file: &str) -> Result<Vec<SchemaDescriptor>> {
        Ok(vec![SchemaDescriptor {
            data_id: DataId::new(1),
            name: "value".to_string(),
            fmts: vec![FieldDescriptor {
                name: "value".to_string(),
                unit: Unit::None,
                ty: FieldType::U64,
                size: 0,
                offset: 0,
            }],
        }])
    }
}

fn make_registry() -> DriverRegistry {
    let poller = Poller::new();
    let registry = DriverRegistry::new(poller, Arc::new(StaticSchema));
    registry.register_ops("nop", Arc::new(NopFactory));
    registry
}

#[test]
fn no_double_registration() {
    let registry = make_registry();
    assert!(registry
        .register_driver("nop", "/dev/x", "base", "file", &InitArgs::new())
        .is_ok());
    assert_eq!(
        registry.register_driver("nop", "/dev/x", "base", "file", &InitArgs::new()),
        Err(Error::DriverAlreadyPresent)
    );
    registry.destroy_driver("/dev/x").unwrap();
    assert!(registry
        .register_driver("nop", "/dev/x", "base", "file", &InitArgs::new())
        .is_ok());
}

#[test]
fn unknown_driver_kind_is_rejected() {
    let registry = make_registry();
    assert_eq!(
        registry.register_driver("ghost", "/dev/y", "base", "file", &InitArgs::new()),
        Err(Error::DriverNotRegistered)
    );
}

#[test]
fn destroy_while_in_use_is_rejected() {
    let registry = make_registry();
    registry
        .register_driver("nop", "/dev/z", "base", "file", &InitArgs::new())
        .unwrap();
    let instance = registry.lookup_by_path("/dev/z").unwrap();
    let queue = Arc::new(hound_lib::Queue::new(8));
    registry
        .ref_driver(
            &instance,
            &queue,
            &[hound_abi::DataRequest::new(DataId::new(1), hound_abi::Period::new(1_000_000))],
        )
        .unwrap();
    assert_eq!(registry.destroy_driver("/dev/z"), Err(Error::DriverInUse));
    registry
        .unref_driver(
            &instance,
            &queue,
            &[hound_abi::DataRequest::new(DataId::new(1), hound_abi::Period::new(1_000_000))],
        )
        .unwrap();
    assert!(registry.destroy_driver("/dev/z").is_ok());
}
