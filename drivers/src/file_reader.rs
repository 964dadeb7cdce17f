//! Flat-file reader (§1, §6): a push-mode driver that tails a text file,
//! emitting one `Bytes` record per line. Mainly useful for replaying
//! recorded sensor logs through the broker without a real device attached.

use std::os::unix::io::RawFd;
use std::sync::Mutex;

use hound_abi::{
    DataDescriptor, DataId, DeviceId, FieldType, InitArgs, Record, Result, Unit,
};
use hound_core::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, PushDriver, PushSink};

use crate::common;

const LINE_ID: u32 = 1;

pub struct FileDriver {
    fd: RawFd,
    leftover: Mutex<Vec<u8>>,
}

impl Driver for FileDriver {
    fn device_name(&self) -> String {
        "file".to_string()
    }

    fn datadesc(&self, descs: &mut Vec<DataDescriptor>) {
        for d in descs.iter_mut() {
            if d.data_id == DataId::new(LINE_ID) {
                d.enabled = true;
            }
        }
    }

    fn setdata(&self, _active: &[ActiveRequest]) {}

    fn start(&self) -> Result<RawFd> {
        Ok(self.fd)
    }

    fn stop(&self) {}

    fn next(&self, _id: DataId) {}

    fn destroy(&self) {
        common::close_fd(self.fd);
    }
}

impl PushDriver for FileDriver {
    fn poll(&self, sink: &dyn PushSink) {
        let mut buf = [0u8; 4096];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            return;
        }

        let mut leftover = self.leftover.lock().unwrap();
        leftover.extend_from_slice(&buf[..n as usize]);

        while let Some(pos) = leftover.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = leftover.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            sink.push_record(Record::new(
                DataId::new(LINE_ID),
                DeviceId::new(0),
                0,
                hound_lib::wall_clock_timestamp(),
                line.to_vec(),
            ));
        }
    }
}

pub struct FileFactory;

impl DriverFactory for FileFactory {
    fn init(&self, path: &str, _args: &InitArgs) -> Result<DriverImpl> {
        let fd = common::open_readonly_nonblock(path)?;
        Ok(DriverImpl::Push(Box::new(FileDriver {
            fd,
            leftover: Mutex::new(Vec::new()),
        })))
    }
}

pub fn schema() -> hound_abi::SchemaDescriptor {
    common::single_field_schema(DataId::new(LINE_ID), "line", "line", Unit::None, FieldType::Bytes)
}
