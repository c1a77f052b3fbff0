//! Periodic telemetry publishing for one device.
//!
//! The publisher owns its connection for the lifetime of the loop. Each
//! tick it walks the configured sensor list in order, samples a reading,
//! serializes it and publishes at QoS 0 — telemetry is loss-tolerant and
//! latency-sensitive, so no acknowledgment is awaited. Between ticks the
//! event loop keeps being polled so keep-alives and inbound traffic are
//! serviced, and the external stop signal is honored at loop boundaries.

use std::time::Duration;

use rumqttc::{ClientError, ConnectionError, Event, Packet, Publish, QoS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::sensor::{Emitter, SensorKind};
use crate::topic::{Address, AddressError, Segment};

use super::session::{BrokerConfig, MqttSession, SessionError};

/// Identity and cadence of one publishing device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub client_id: String,
    pub user_id: String,
    pub device_id: String,
    /// Sensor channels published each tick, in this order.
    pub sensors: Vec<SensorKind>,
    pub period_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            client_id: "esp32_sim_publisher".to_string(),
            user_id: "user_001".to_string(),
            device_id: "esp32_sim".to_string(),
            sensors: vec![SensorKind::Gps, SensorKind::Battery, SensorKind::Acc],
            period_secs: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("connection lost while publishing: {0}")]
    Connection(#[from] ConnectionError),

    #[error("client request failed: {0}")]
    Client(#[from] ClientError),

    #[error("invalid telemetry address: {0}")]
    Address(#[from] AddressError),
}

/// Drives the `Disconnected → Connecting → Connected → Publishing` cycle
/// for one device session.
pub struct TelemetryPublisher {
    session: MqttSession,
    emitter: Emitter,
    config: PublisherConfig,
    namespace: String,
}

impl TelemetryPublisher {
    /// Connects the device session and subscribes to the device's own
    /// command topic, the inbound half of the command path.
    pub async fn connect(
        namespace: impl Into<String>,
        broker: &BrokerConfig,
        config: PublisherConfig,
        emitter: Emitter,
    ) -> Result<Self, PublishError> {
        let namespace = namespace.into();
        let session = MqttSession::connect(broker, &config.client_id).await?;

        let command_topic =
            Address::command(&namespace, &config.user_id, &config.device_id).encode()?;
        session
            .client
            .subscribe(&command_topic, QoS::AtLeastOnce)
            .await?;
        debug!(topic = %command_topic, "listening for device commands");

        Ok(TelemetryPublisher {
            session,
            emitter,
            config,
            namespace,
        })
    }

    /// Publishes one pass over all sensors per period until the stop
    /// signal flips, then disconnects cleanly.
    pub async fn run_loop(mut self, mut stop: watch::Receiver<bool>) -> Result<(), PublishError> {
        let period = Duration::from_secs(self.config.period_secs.max(1));
        let mut tick = tokio::time::interval(period);
        info!(
            device = %self.config.device_id,
            period_secs = period.as_secs(),
            "telemetry loop started"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => self.publish_pass().await?,
                event = self.session.eventloop.poll() => {
                    if let Event::Incoming(Packet::Publish(publish)) = event? {
                        self.handle_inbound(&publish);
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

        info!("stop requested, disconnecting publisher");
        self.session.disconnect().await;
        // One more poll flushes the DISCONNECT packet.
        let _ = self.session.eventloop.poll().await;
        Ok(())
    }

    async fn publish_pass(&mut self) -> Result<(), PublishError> {
        for &kind in &self.config.sensors {
            let payload = self.emitter.sample(kind).serialize();
            let topic = Address::sensor(
                &self.namespace,
                &self.config.user_id,
                &self.config.device_id,
                kind.as_str(),
            )
            .encode()?;
            self.session
                .client
                .publish(&topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
                .await?;
            info!(%topic, %payload, "telemetry sent");
        }
        Ok(())
    }

    fn handle_inbound(&self, publish: &Publish) {
        let payload = String::from_utf8_lossy(&publish.payload);
        match Address::decode(&publish.topic) {
            Ok(address) if address.segment == Segment::Command => {
                info!(
                    device = %address.device_id,
                    command = %payload,
                    "command received"
                );
            }
            _ => warn!(topic = %publish.topic, %payload, "unexpected inbound message"),
        }
    }
}
