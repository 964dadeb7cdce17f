//! Concrete drivers behind the op table (§1, §6). Each module owns exactly
//! one driver kind: a factory implementing [`hound_core::DriverFactory`]
//! plus the [`hound_core::Driver`]/[`hound_core::PullDriver`]/
//! [`hound_core::PushDriver`] impl it produces. [`register_factories`] is
//! the module-constructor step the registry's own docs describe (§4.2): one
//! process-wide call populating the name→factory map before any
//! `register_driver` call can succeed.

pub mod can_bcm_obd2;
pub mod common;
pub mod counter;
pub mod file_reader;
pub mod gpsd;
pub mod iio;
pub mod mqtt;
pub mod socketcan;

use std::sync::Arc;

use hound_core::DriverRegistry;

/// Register every built-in driver kind's factory. Called once during broker
/// startup, before any config line can reference a driver by name.
pub fn register_factories(registry: &DriverRegistry) {
    registry.register_ops("counter", Arc::new(counter::CounterFactory));
    registry.register_ops("file", Arc::new(file_reader::FileFactory));
    registry.register_ops("iio", Arc::new(iio::IioFactory));
    registry.register_ops("socketcan", Arc::new(socketcan::SocketCanFactory));
    registry.register_ops("can_bcm_obd2", Arc::new(can_bcm_obd2::ObdTwoFactory));
    registry.register_ops("gpsd", Arc::new(gpsd::GpsdFactory));
    registry.register_ops("mqtt", Arc::new(mqtt::MqttFactory));
}

/// The schema each built-in driver kind reports, keyed by the `name` passed
/// to [`register_factories`]. A [`hound_core::SchemaSource`] for the
/// built-ins can simply look up this table by `schema_file`.
pub fn builtin_schema(kind: &str) -> Option<hound_abi::SchemaDescriptor> {
    Some(match kind {
        "counter" => counter::schema(),
        "file" => file_reader::schema(),
        "iio" => iio::schema(),
        "socketcan" => socketcan::schema(),
        "can_bcm_obd2" => can_bcm_obd2::schema(),
        "gpsd" => gpsd::schema(),
        "mqtt" => mqtt::schema(),
        _ => return None,
    })
}
