use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use hound_abi::{DataDescriptor, DataId, Error, FieldDescriptor, FieldType, InitArgs, Period, Result, SchemaDescriptor, Unit};

use super::*;
use crate::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, ParseOutcome, PullDriver};
use crate::poller::Poller;
use crate::schema_source::SchemaSource;

struct NopDriver {
    fds: Mutex<(RawFd, RawFd)>,
    stop_count: AtomicU32,
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
        Ok(self.fds.lock().unwrap().0)
    }

    fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
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
            fds: Mutex::new((fds[0], fds[1])),
            stop_count: AtomicU32::new(0),
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

fn make_registry_with_driver(path: &str) -> Arc<DriverRegistry> {
    let poller = Poller::new();
    let registry = Arc::new(DriverRegistry::new(poller, Arc::new(StaticSchema)));
    registry.register_ops("nop", Arc::new(NopFactory));
    registry
        .register_driver("nop", path, "base", "file", &InitArgs::new())
        .unwrap();
    registry
}

fn noop_callback() -> Option<Callback> {
    Some(Arc::new(|_rec: &hound_abi::Record, _seqno: u64| {}))
}

#[test]
fn alloc_rejects_zero_queue_length() {
    let registry = make_registry_with_driver("/dev/a");
    let req = [hound_abi::DataRequest::new(DataId::new(1), Period::new(1_000_000))];
    assert_eq!(
        Context::alloc(registry, 0, &req, noop_callback()).err(),
        Some(Error::EmptyQueue)
    );
}

#[test]
fn alloc_rejects_unknown_data_id() {
    let registry = make_registry_with_driver("/dev/b");
    let req = [hound_abi::DataRequest::new(DataId::new(999), Period::new(1_000_000))];
    assert_eq!(
        Context::alloc(registry, 8, &req, noop_callback()).err(),
        Some(Error::DataIdDoesNotExist)
    );
}

#[test]
fn alloc_rejects_missing_callback() {
    let registry = make_registry_with_driver("/dev/c");
    let req = [hound_abi::DataRequest::new(DataId::new(1), Period::new(1_000_000))];
    assert_eq!(
        Context::alloc(registry, 8, &req, None).err(),
        Some(Error::MissingCallback)
    );
}

#[test]
fn start_stop_lifecycle() {
    let registry = make_registry_with_driver("/dev/d");
    let req = [hound_abi::DataRequest::new(DataId::new(1), Period::new(1_000_000))];
    let ctx = Context::alloc(registry, 8, &req, noop_callback()).unwrap();

    assert_eq!(ctx.stop().err(), Some(Error::CtxNotActive));
    ctx.start().unwrap();
    assert_eq!(ctx.start().err(), Some(Error::CtxActive));
    ctx.stop().unwrap();
    assert_eq!(ctx.stop().err(), Some(Error::CtxNotActive));
    ctx.free().unwrap();
}

#[test]
fn read_nowait_on_empty_queue_is_an_error() {
    let registry = make_registry_with_driver("/dev/e");
    let req = [hound_abi::DataRequest::new(DataId::new(1), Period::new(1_000_000))];
    let ctx = Context::alloc(registry, 8, &req, noop_callback()).unwrap();
    assert_eq!(ctx.read_nowait(1).err(), Some(Error::CtxNotActive));
    ctx.start().unwrap();
    assert_eq!(ctx.read_nowait(1).err(), Some(Error::EmptyQueue));
    ctx.stop().unwrap();
}

#[test]
fn modify_rejects_duplicate_request_and_leaves_state_untouched() {
    let registry = make_registry_with_driver("/dev/f");
    let req = [hound_abi::DataRequest::new(DataId::new(1), Period::new(1_000_000))];
    let ctx = Context::alloc(registry, 8, &req, noop_callback()).unwrap();
    ctx.start().unwrap();

    let bad = [
        hound_abi::DataRequest::new(DataId::new(1), Period::new(1_000_000)),
        hound_abi::DataRequest::new(DataId::new(1), Period::new(1_000_000)),
    ];
    assert_eq!(
        ctx.modify(&bad, None, false).err(),
        Some(Error::DuplicateDataRequested)
    );
    // The context should still be fully active with its original request.
    assert_eq!(ctx.read_nowait(1).err(), Some(Error::EmptyQueue));
    ctx.stop().unwrap();
}

/// §8: "After `stop` and before `start` again, a blocked `read` returns
/// `CTX_STOPPED`" — a `read_blocking` in flight when `stop` fires.
#[test]
fn blocked_read_returns_ctx_stopped_on_concurrent_stop() {
    let registry = make_registry_with_driver("/dev/g");
    let req = [hound_abi::DataRequest::new(DataId::new(1), Period::new(1_000_000))];
    let ctx = Context::alloc(registry, 8, &req, noop_callback()).unwrap();
    ctx.start().unwrap();

    let stopper = ctx.clone();
    let stopper_thread = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        stopper.stop().unwrap();
    });

    // The queue never receives any records, so this blocks until `stop`
    // interrupts it.
    let result = ctx.read_blocking(1);
    stopper_thread.join().unwrap();

    assert_eq!(result.err(), Some(Error::CtxStopped));
}
