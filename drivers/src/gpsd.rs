//! gpsd stand-in (§1): a push-mode driver that connects to a gpsd-compatible
//! TCP endpoint (`gpsd_host`/`gpsd_port` init args, default `127.0.0.1:2947`)
//! and emits one `Bytes` record per newline-terminated JSON report line.
//! Parsing the gpsd JSON protocol itself (`TPV`/`SKY`/...) is left to
//! whatever reads the record payload downstream (§1).

use std::os::unix::io::RawFd;
use std::sync::Mutex;

use hound_abi::{
    DataDescriptor, DataId, DeviceId, FieldType, InitArgs, Record, Result, Unit,
};
use hound_core::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, PushDriver, PushSink};

use crate::common;

const REPORT_ID: u32 = 1;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 2947;

pub struct GpsdDriver {
    fd: RawFd,
    leftover: Mutex<Vec<u8>>,
}

impl Driver for GpsdDriver {
    fn device_name(&self) -> String {
        "gpsd".to_string()
    }

    fn datadesc(&self, descs: &mut Vec<DataDescriptor>) {
        for d in descs.iter_mut() {
            if d.data_id == DataId::new(REPORT_ID) {
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

impl PushDriver for GpsdDriver {
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
                DataId::new(REPORT_ID),
                DeviceId::new(0),
                0,
                hound_lib::wall_clock_timestamp(),
                line.to_vec(),
            ));
        }
    }
}

pub struct GpsdFactory;

impl DriverFactory for GpsdFactory {
    fn init(&self, _path: &str, args: &InitArgs) -> Result<DriverImpl> {
        let host = args
            .get("gpsd_host")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_HOST);
        let port = args
            .get("gpsd_port")
            .and_then(|v| v.as_u64())
            .map(|p| p as u16)
            .unwrap_or(DEFAULT_PORT);
        let fd = common::connect_tcp(host, port)?;
        Ok(DriverImpl::Push(Box::new(GpsdDriver {
            fd,
            leftover: Mutex::new(Vec::new()),
        })))
    }
}

pub fn schema() -> hound_abi::SchemaDescriptor {
    common::single_field_schema(DataId::new(REPORT_ID), "report", "report", Unit::None, FieldType::Bytes)
}
