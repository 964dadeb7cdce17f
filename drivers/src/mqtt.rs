//! MQTT/msgpack stand-in (§1): connects to a broker, issues a bare-bones
//! CONNECT + SUBSCRIBE (QoS 0, no keep-alive ping, no reconnect, sent
//! without waiting for CONNACK) and emits the payload of every PUBLISH it
//! receives as a `Bytes` record. Payloads are expected to be msgpack-encoded
//! by the publisher; decoding them is left to the record's consumer (§1).

use std::os::unix::io::RawFd;
use std::sync::Mutex;

use hound_abi::{
    DataDescriptor, DataId, DeviceId, FieldType, InitArgs, Record, Result, Unit,
};
use hound_core::driver::{ActiveRequest, Driver, DriverFactory, DriverImpl, PushDriver, PushSink};

use crate::common;

const MESSAGE_ID: u32 = 1;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_TOPIC: &str = "hound/#";

fn encode_mqtt_string(s: &str, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    out.push((bytes.len() >> 8) as u8);
    out.push((bytes.len() & 0xFF) as u8);
    out.extend_from_slice(bytes);
}

fn encode_remaining_length(mut len: usize, out: &mut Vec<u8>) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if len == 0 {
            break;
        }
    }
}

/// Decode a varint remaining-length field. Returns `(value, bytes_used)`, or
/// `None` if `buf` doesn't yet contain the whole field.
fn decode_remaining_length(buf: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, &byte) in buf.iter().enumerate().take(4) {
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        multiplier *= 128;
    }
    None
}

fn build_connect_packet(client_id: &str) -> Vec<u8> {
    let mut variable_and_payload = Vec::new();
    encode_mqtt_string("MQTT", &mut variable_and_payload);
    variable_and_payload.push(0x04); // protocol level 3.1.1
    variable_and_payload.push(0x02); // connect flags: clean session
    variable_and_payload.push(0x00); // keep alive hi
    variable_and_payload.push(0x3C); // keep alive lo (60s)
    encode_mqtt_string(client_id, &mut variable_and_payload);

    let mut packet = vec![0x10];
    encode_remaining_length(variable_and_payload.len(), &mut packet);
    packet.extend_from_slice(&variable_and_payload);
    packet
}

fn build_subscribe_packet(topic: &str) -> Vec<u8> {
    let mut variable_and_payload = vec![0x00, 0x01]; // packet identifier
    encode_mqtt_string(topic, &mut variable_and_payload);
    variable_and_payload.push(0x00); // requested QoS 0

    let mut packet = vec![0x82];
    encode_remaining_length(variable_and_payload.len(), &mut packet);
    packet.extend_from_slice(&variable_and_payload);
    packet
}

/// Pull one complete MQTT packet off the front of `buf`. Returns `(total
/// bytes consumed, publish payload)`; the payload is `None` for any packet
/// type other than PUBLISH (CONNACK, SUBACK, PINGRESP, ...), which is still
/// consumed so the stream doesn't desync.
fn take_one_packet(buf: &[u8]) -> Option<(usize, Option<Vec<u8>>)> {
    if buf.is_empty() {
        return None;
    }
    let packet_type = buf[0] >> 4;
    let (remaining_len, len_field_size) = decode_remaining_length(&buf[1..])?;
    let header_len = 1 + len_field_size;
    let total_len = header_len + remaining_len;
    if buf.len() < total_len {
        return None;
    }

    if packet_type != 0x03 {
        return Some((total_len, None));
    }

    let body = &buf[header_len..total_len];
    if body.len() < 2 {
        return Some((total_len, None));
    }
    let topic_len = ((body[0] as usize) << 8) | body[1] as usize;
    let qos = (buf[0] >> 1) & 0x03;
    let mut offset = 2 + topic_len;
    if qos > 0 {
        offset += 2; // packet identifier, present for QoS 1/2
    }
    if offset > body.len() {
        return Some((total_len, None));
    }
    Some((total_len, Some(body[offset..].to_vec())))
}

pub struct MqttDriver {
    fd: RawFd,
    leftover: Mutex<Vec<u8>>,
}

impl Driver for MqttDriver {
    fn device_name(&self) -> String {
        "mqtt".to_string()
    }

    fn datadesc(&self, descs: &mut Vec<DataDescriptor>) {
        for d in descs.iter_mut() {
            if d.data_id == DataId::new(MESSAGE_ID) {
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

impl PushDriver for MqttDriver {
    fn poll(&self, sink: &dyn PushSink) {
        let mut buf = [0u8; 4096];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut _, buf.len()) };
        if n <= 0 {
            return;
        }

        let mut leftover = self.leftover.lock().unwrap();
        leftover.extend_from_slice(&buf[..n as usize]);

        loop {
            match take_one_packet(&leftover) {
                Some((consumed, payload)) => {
                    if let Some(payload) = payload {
                        if !payload.is_empty() {
                            sink.push_record(Record::new(
                                DataId::new(MESSAGE_ID),
                                DeviceId::new(0),
                                0,
                                hound_lib::wall_clock_timestamp(),
                                payload,
                            ));
                        }
                    }
                    leftover.drain(..consumed);
                }
                None => break,
            }
        }
    }
}

pub struct MqttFactory;

impl DriverFactory for MqttFactory {
    fn init(&self, _path: &str, args: &InitArgs) -> Result<DriverImpl> {
        let host = args
            .get("mqtt_host")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_HOST);
        let port = args
            .get("mqtt_port")
            .and_then(|v| v.as_u64())
            .map(|p| p as u16)
            .unwrap_or(DEFAULT_PORT);
        let topic = args
            .get("mqtt_topic")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_TOPIC);

        let fd = common::connect_tcp(host, port)?;
        let connect = build_connect_packet("hound");
        let subscribe = build_subscribe_packet(topic);
        unsafe {
            libc::write(fd, connect.as_ptr() as *const _, connect.len());
            libc::write(fd, subscribe.as_ptr() as *const _, subscribe.len());
        }

        Ok(DriverImpl::Push(Box::new(MqttDriver {
            fd,
            leftover: Mutex::new(Vec::new()),
        })))
    }
}

pub fn schema() -> hound_abi::SchemaDescriptor {
    common::single_field_schema(DataId::new(MESSAGE_ID), "payload", "payload", Unit::None, FieldType::Bytes)
}
