//! SocketCAN stand-in (§1): a push-mode driver decoding classic 16-byte
//! `struct can_frame` records (4-byte CAN ID, 1-byte DLC, 3 bytes padding,
//! 8 bytes data) from a raw byte source.
//!
//! A production driver would `socket(AF_CAN, SOCK_RAW, CAN_RAW)` and `bind`
//! to an interface by name; acquiring and binding that socket is out of
//! scope for this stand-in (§1: wire-format/transport acquisition is a
//! collaborator's problem), so `path` instead names anything already
//! producing the same 16-byte frames — a bound CAN socket's fd exposed
//! through a bridge, or a recorded capture file for replay.

use std::os::unix::io::RawFd;

use hound_abi::{DataDescriptor, DataId, DeviceId, FieldType, InitArgs, Record, Result, Unit};
use hound_core::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, PushDriver, PushSink};

use crate::common;

const FRAME_ID: u32 = 1;
const FRAME_WIDTH: usize = 16;

pub struct SocketCanDriver {
    fd: RawFd,
}

impl Driver for SocketCanDriver {
    fn device_name(&self) -> String {
        "socketcan".to_string()
    }

    fn datadesc(&self, descs: &mut Vec<DataDescriptor>) {
        for d in descs.iter_mut() {
            if d.data_id == DataId::new(FRAME_ID) {
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

impl PushDriver for SocketCanDriver {
    fn poll(&self, sink: &dyn PushSink) {
        let mut buf = [0u8; FRAME_WIDTH * 16];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            return;
        }
        let n = n as usize;
        let mut offset = 0;
        while offset + FRAME_WIDTH <= n {
            let frame = buf[offset..offset + FRAME_WIDTH].to_vec();
            sink.push_record(Record::new(
                DataId::new(FRAME_ID),
                DeviceId::new(0),
                0,
                hound_lib::wall_clock_timestamp(),
                frame,
            ));
            offset += FRAME_WIDTH;
        }
    }
}

pub struct SocketCanFactory;

impl DriverFactory for SocketCanFactory {
    fn init(&self, path: &str, _args: &InitArgs) -> Result<DriverImpl> {
        let fd = common::open_readonly_nonblock(path)?;
        Ok(DriverImpl::Push(Box::new(SocketCanDriver { fd })))
    }
}

pub fn schema() -> hound_abi::SchemaDescriptor {
    common::single_field_schema(DataId::new(FRAME_ID), "frame", "frame", Unit::None, FieldType::Bytes)
}
