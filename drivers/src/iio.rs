//! Industrial I/O stand-in (§1): a pull-mode driver for a Linux IIO buffered
//! character device (`/dev/iio:deviceN`), treating each fixed-size sample as
//! one little-endian `i32`. Real IIO channel scan layouts (multi-channel,
//! mixed width, per-channel scale/offset) are out of scope here — this
//! exists to exercise the op table against a real poll()-able chardev, not
//! to replace `libiio`.

use std::os::unix::io::RawFd;

use hound_abi::{DataDescriptor, DataId, DeviceId, FieldType, InitArgs, Record, Result, Unit};
use hound_core::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, ParseOutcome, PullDriver};

use crate::common;

const SAMPLE_ID: u32 = 1;
const SAMPLE_WIDTH: usize = 4;

pub struct IioDriver {
    fd: RawFd,
}

impl Driver for IioDriver {
    fn device_name(&self) -> String {
        "iio".to_string()
    }

    fn datadesc(&self, descs: &mut Vec<DataDescriptor>) {
        for d in descs.iter_mut() {
            if d.data_id == DataId::new(SAMPLE_ID) {
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

impl PullDriver for IioDriver {
    fn parse(&self, buf: &[u8]) -> ParseOutcome {
        let mut records = Vec::new();
        let mut consumed = 0;
        while buf.len() - consumed >= SAMPLE_WIDTH {
            let sample = &buf[consumed..consumed + SAMPLE_WIDTH];
            let value = i32::from_le_bytes(sample.try_into().unwrap());
            records.push(Record::new(
                DataId::new(SAMPLE_ID),
                DeviceId::new(0),
                0,
                hound_lib::wall_clock_timestamp(),
                value.to_le_bytes().to_vec(),
            ));
            consumed += SAMPLE_WIDTH;
        }
        ParseOutcome {
            bytes_left: buf.len() - consumed,
            records,
        }
    }
}

pub struct IioFactory;

impl DriverFactory for IioFactory {
    fn init(&self, path: &str, _args: &InitArgs) -> Result<DriverImpl> {
        let fd = common::open_readonly_nonblock(path)?;
        Ok(DriverImpl::Pull(Box::new(IioDriver { fd })))
    }
}

pub fn schema() -> hound_abi::SchemaDescriptor {
    common::single_field_schema(DataId::new(SAMPLE_ID), "sample", "sample", Unit::None, FieldType::I32)
}
