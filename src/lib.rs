//! Topic-addressed telemetry bus for a small IoT fleet.
//!
//! Devices publish sensor readings under the hierarchical namespace
//! `system_iot/<user_id>/<device_id>/<sensor>`; a monitor demultiplexes a
//! single `system_iot/+/+/+` wildcard subscription into per-device
//! streams; commands travel the other way on the device's `cmd` channel
//! at QoS 1 with explicit delivery confirmation.
//!
//! The broker is an external collaborator — anything speaking MQTT 3.1.1
//! with username/password auth works. Each role (publisher, monitor,
//! command sender) owns exactly one connection for its lifetime.

pub mod bus;
pub mod config;
pub mod sensor;
pub mod topic;
