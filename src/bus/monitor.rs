//! Fleet-wide telemetry monitoring over a single wildcard subscription.
//!
//! The monitor subscribes once to `<namespace>/+/+/+` and demultiplexes
//! everything the broker delivers: a topic that decodes into a four-segment
//! [`Address`] is routed to the per-(user, device, sensor) reading handler
//! or, for a `cmd` fourth segment, to the command handler; anything else
//! degrades to a raw event. No message is ever dropped silently and no
//! malformed message terminates the listen loop.

use chrono::NaiveDateTime;
use rumqttc::{ClientError, ConnectionError, Event, Packet, QoS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::topic::{subscription_pattern, Address, Segment};

use super::session::{BrokerConfig, MqttSession, SessionError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub client_id: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            client_id: "pc_monitor_client".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("subscription failed: {0}")]
    Subscribe(#[from] ClientError),

    #[error("connection lost while listening: {0}")]
    Connection(#[from] ConnectionError),
}

/// A telemetry message that decoded into a sensor address.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingEvent {
    pub timestamp: NaiveDateTime,
    pub user: String,
    pub device: String,
    pub kind: String,
    pub payload: String,
}

/// A message on some device's command channel.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
    pub timestamp: NaiveDateTime,
    pub user: String,
    pub device: String,
    pub payload: String,
}

/// Degraded path: the topic did not decode, so the message is surfaced
/// verbatim instead of being dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub timestamp: NaiveDateTime,
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Reading(ReadingEvent),
    Command(CommandEvent),
    Raw(RawEvent),
}

/// Receives demultiplexed bus traffic. Passed in at construction instead
/// of being wired through callbacks on shared client state.
pub trait TelemetryHandler: Send {
    fn on_reading(&mut self, event: ReadingEvent);
    fn on_command(&mut self, event: CommandEvent);
    fn on_raw(&mut self, event: RawEvent);
}

/// Routes one raw message to its logical stream.
pub fn demux(topic: &str, payload: &[u8], timestamp: NaiveDateTime) -> MonitorEvent {
    let payload = String::from_utf8_lossy(payload).into_owned();
    match Address::decode(topic) {
        Ok(address) => match address.segment {
            Segment::Sensor(kind) => MonitorEvent::Reading(ReadingEvent {
                timestamp,
                user: address.user_id,
                device: address.device_id,
                kind,
                payload,
            }),
            Segment::Command => MonitorEvent::Command(CommandEvent {
                timestamp,
                user: address.user_id,
                device: address.device_id,
                payload,
            }),
        },
        Err(e) => {
            debug!(topic, "falling back to raw display: {e}");
            MonitorEvent::Raw(RawEvent {
                timestamp,
                topic: topic.to_string(),
                payload,
            })
        }
    }
}

/// Owns the monitoring session: `Disconnected → Connecting → Subscribed →
/// Listening` until the stop signal flips or the transport fails.
pub struct TelemetryMonitor {
    session: MqttSession,
    pattern: String,
}

impl TelemetryMonitor {
    /// Connects and issues the single wildcard subscription.
    pub async fn connect(
        namespace: &str,
        broker: &BrokerConfig,
        config: &MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let session = MqttSession::connect(broker, &config.client_id).await?;
        let pattern = subscription_pattern(namespace);
        session.client.subscribe(&pattern, QoS::AtLeastOnce).await?;
        info!(%pattern, "listening to fleet telemetry");
        Ok(TelemetryMonitor { session, pattern })
    }

    /// The wildcard pattern this monitor is bound to.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Dispatches incoming messages to the handler until stopped.
    ///
    /// Transport errors surface to the caller; malformed messages do not —
    /// they take the raw fallback path and the loop keeps going.
    pub async fn listen(
        &mut self,
        handler: &mut dyn TelemetryHandler,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), MonitorError> {
        loop {
            tokio::select! {
                event = self.session.eventloop.poll() => {
                    if let Event::Incoming(Packet::Publish(publish)) = event? {
                        let timestamp = chrono::Local::now().naive_local();
                        match demux(&publish.topic, &publish.payload, timestamp) {
                            MonitorEvent::Reading(reading) => handler.on_reading(reading),
                            MonitorEvent::Command(command) => handler.on_command(command),
                            MonitorEvent::Raw(raw) => handler.on_raw(raw),
                        }
                    }
                }
                changed = stop.changed() => {
                    // A dropped sender counts as a stop request.
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!(pattern = %self.pattern, "stop requested, disconnecting monitor");
        self.session.disconnect().await;
        let _ = self.session.eventloop.poll().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    #[test]
    fn demux_routes_sensor_topics_per_device() {
        let timestamp = now();
        let event = demux(
            "system_iot/user_001/esp32_sim/gps",
            b"50.512345,19.734567",
            timestamp,
        );
        assert_eq!(
            event,
            MonitorEvent::Reading(ReadingEvent {
                timestamp,
                user: "user_001".to_string(),
                device: "esp32_sim".to_string(),
                kind: "gps".to_string(),
                payload: "50.512345,19.734567".to_string(),
            })
        );
    }

    #[test]
    fn demux_routes_cmd_topics_to_command_stream() {
        let timestamp = now();
        let event = demux("system_iot/user_001/esp32/cmd", b"DISARM", timestamp);
        assert_eq!(
            event,
            MonitorEvent::Command(CommandEvent {
                timestamp,
                user: "user_001".to_string(),
                device: "esp32".to_string(),
                payload: "DISARM".to_string(),
            })
        );
    }

    #[test]
    fn demux_degrades_malformed_topics_to_raw() {
        let timestamp = now();
        let event = demux("bad/topic", b"hello", timestamp);
        assert_eq!(
            event,
            MonitorEvent::Raw(RawEvent {
                timestamp,
                topic: "bad/topic".to_string(),
                payload: "hello".to_string(),
            })
        );
    }

    #[test]
    fn demux_survives_non_utf8_payloads() {
        let event = demux("system_iot/user_001/esp32/battery", &[0xff, 0xfe], now());
        match event {
            MonitorEvent::Reading(reading) => assert!(!reading.payload.is_empty()),
            other => panic!("wrong route: {other:?}"),
        }
    }
}
