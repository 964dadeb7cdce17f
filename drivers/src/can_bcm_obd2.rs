//! CAN-BCM OBD-II stand-in (§1): filters the same 16-byte classic CAN frame
//! stream [`crate::socketcan`] reads for SAE J1979 response frames (CAN ID
//! `0x7E8`) and emits their 8-byte data payload.
//!
//! A production driver would open a `CAN_BCM` socket and schedule cyclic
//! `TX_SETUP` requests for the PIDs of interest; that scheduling is out of
//! scope here (§1), so this stand-in only does the response-side filtering,
//! assuming something else is driving the request side of the bus.

use std::os::unix::io::RawFd;

use hound_abi::{DataDescriptor, DataId, DeviceId, FieldType, InitArgs, Record, Result, Unit};
use hound_core::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, PushDriver, PushSink};

use crate::common;

const RESPONSE_ID: u32 = 1;
const FRAME_WIDTH: usize = 16;
const OBD2_RESPONSE_CAN_ID: u32 = 0x7E8;

pub struct ObdTwoDriver {
    fd: RawFd,
}

impl Driver for ObdTwoDriver {
    fn device_name(&self) -> String {
        "can_bcm_obd2".to_string()
    }

    fn datadesc(&self, descs: &mut Vec<DataDescriptor>) {
        for d in descs.iter_mut() {
            if d.data_id == DataId::new(RESPONSE_ID) {
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

impl PushDriver for ObdTwoDriver {
    fn poll(&self, sink: &dyn PushSink) {
        let mut buf = [0u8; FRAME_WIDTH * 16];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            return;
        }
        let n = n as usize;
        let mut offset = 0;
        while offset + FRAME_WIDTH <= n {
            let frame = &buf[offset..offset + FRAME_WIDTH];
            offset += FRAME_WIDTH;

            let can_id = u32::from_le_bytes(frame[0..4].try_into().unwrap());
            if can_id & 0x1FFF_FFFF != OBD2_RESPONSE_CAN_ID {
                continue;
            }
            let dlc = frame[4] as usize;
            let data_len = dlc.min(8);
            sink.push_record(Record::new(
                DataId::new(RESPONSE_ID),
                DeviceId::new(0),
                0,
                hound_lib::wall_clock_timestamp(),
                frame[8..8 + data_len].to_vec(),
            ));
        }
    }
}

pub struct ObdTwoFactory;

impl DriverFactory for ObdTwoFactory {
    fn init(&self, path: &str, _args: &InitArgs) -> Result<DriverImpl> {
        let fd = common::open_readonly_nonblock(path)?;
        Ok(DriverImpl::Push(Box::new(ObdTwoDriver { fd })))
    }
}

pub fn schema() -> hound_abi::SchemaDescriptor {
    common::single_field_schema(DataId::new(RESPONSE_ID), "pid_response", "pid_response", Unit::None, FieldType::Bytes)
}
