//! # Telemetry Bus Module
//!
//! Everything that talks to the MQTT broker lives here. The bus is split
//! into four focused submodules:
//!
//! ```text
//! bus/
//! ├── session.rs   - One broker connection: options, connect handshake
//! ├── publisher.rs - Periodic multi-sensor telemetry loop (QoS 0)
//! ├── monitor.rs   - Wildcard subscription + per-device demultiplexing
//! └── command.rs   - At-least-once command delivery with ack tracking
//! ```
//!
//! ## Ownership model
//!
//! Each role owns exactly one [`session::MqttSession`] for its lifetime;
//! sessions are never shared between tasks. The publisher's send loop and
//! the monitor's listen loop are independent connections with no mutable
//! state in common, and both honor an external stop signal
//! (`tokio::sync::watch`) checked at loop boundaries.
//!
//! ## Error policy
//!
//! Transport-level failures (network down, credentials rejected) surface
//! to the owning loop's caller and are never silently retried. Per-message
//! problems — above all a topic that does not parse into a four-segment
//! address — are isolated: the monitor degrades to raw display and keeps
//! listening.

pub mod command;
pub mod monitor;
pub mod publisher;
pub mod session;

pub use command::{CommandChannel, CommandConfig, CommandError, DeliveryReceipt};
pub use monitor::{
    CommandEvent, MonitorConfig, MonitorError, MonitorEvent, RawEvent, ReadingEvent,
    TelemetryHandler, TelemetryMonitor,
};
pub use publisher::{PublishError, PublisherConfig, TelemetryPublisher};
pub use session::{BrokerConfig, ConnectionState, MqttSession, SessionError};
