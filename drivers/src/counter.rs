//! Synthetic counter driver (§8 scenario 1 "Counter"): a single pull-mode
//! data stream whose value increments by one on every tick. Used by the
//! testable-properties suite and as the simplest possible worked example of
//! the driver ABI.
//!
//! `next()` arms a self-pipe byte the way [`crate::counter`] has no wire
//! protocol to wait on; `parse` consumes exactly one byte per sample,
//! mirroring the poller's "bytes_left == 0 means fully consumed" contract
//! (§4.2.2) without needing a real device underneath.

use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use hound_abi::{
    DataDescriptor, DataId, DeviceId, FieldType, InitArgs, Record, Result, Unit,
};
use hound_core::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, ParseOutcome, PullDriver};

use crate::common;

const COUNT_ID: u32 = 1;

pub struct CounterDriver {
    read_fd: RawFd,
    write_fd: RawFd,
    value: AtomicU64,
}

impl Driver for CounterDriver {
    fn device_name(&self) -> String {
        "counter".to_string()
    }

    fn datadesc(&self, descs: &mut Vec<DataDescriptor>) {
        for d in descs.iter_mut() {
            if d.data_id == DataId::new(COUNT_ID) {
                d.enabled = true;
            }
        }
    }

    fn setdata(&self, _active: &[ActiveRequest]) {}

    fn start(&self) -> Result<RawFd> {
        Ok(self.read_fd)
    }

    fn stop(&self) {}

    fn next(&self, id: DataId) {
        if id.get() != COUNT_ID {
            return;
        }
        let byte = [1u8];
        unsafe {
            libc::write(self.write_fd, byte.as_ptr() as *const _, 1);
        }
    }

    fn destroy(&self) {
        common::close_fd(self.read_fd);
        common::close_fd(self.write_fd);
    }
}

impl PullDriver for CounterDriver {
    fn parse(&self, buf: &[u8]) -> ParseOutcome {
        let mut records = Vec::with_capacity(buf.len());
        for _ in buf {
            let value = self.value.fetch_add(1, Ordering::SeqCst);
            records.push(Record::new(
                DataId::new(COUNT_ID),
                DeviceId::new(0),
                0,
                hound_lib::wall_clock_timestamp(),
                value.to_le_bytes().to_vec(),
            ));
        }
        ParseOutcome {
            bytes_left: 0,
            records,
        }
    }
}

pub struct CounterFactory;

impl DriverFactory for CounterFactory {
    fn init(&self, _path: &str, _args: &InitArgs) -> Result<DriverImpl> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK) };
        if rc != 0 {
            return Err(hound_abi::Error::from_errno(
                std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO),
            ));
        }
        Ok(DriverImpl::Pull(Box::new(CounterDriver {
            read_fd: fds[0],
            write_fd: fds[1],
            value: AtomicU64::new(0),
        })))
    }
}

/// The schema `register_driver` loads for a `counter` instance (§4.5): one
/// `U64` field named `count`, no unit.
pub fn schema() -> hound_abi::SchemaDescriptor {
    common::single_field_schema(DataId::new(COUNT_ID), "count", "count", Unit::None, FieldType::U64)
}
