//! At-least-once command delivery with explicit ack confirmation.
//!
//! Commands are published at QoS 1 and the caller blocks until the broker
//! acknowledges the packet or the timeout elapses. Only the issuing call
//! site blocks: the same call keeps driving the event loop, so the
//! transport continues to service keep-alives and other traffic while
//! waiting. On timeout the receipt is abandoned and nothing is retried —
//! retry policy belongs to the caller.

use std::time::Duration;

use rumqttc::{ClientError, ConnectionError, Event, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::topic::{Address, AddressError};

use super::session::{BrokerConfig, MqttSession, SessionError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub client_id: String,
    pub user_id: String,
    /// Device whose `cmd` channel receives the command.
    pub device_id: String,
    pub ack_timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        CommandConfig {
            client_id: "pc_publisher".to_string(),
            user_id: "user_001".to_string(),
            device_id: "esp32".to_string(),
            ack_timeout_secs: 10,
        }
    }
}

/// Outcome of a confirmed QoS 1 publish, correlated by packet id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: u16,
    pub confirmed: bool,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid command address: {0}")]
    Address(#[from] AddressError),

    #[error("publish request failed: {0}")]
    Publish(#[from] ClientError),

    #[error("connection lost while awaiting ack: {0}")]
    Connection(#[from] ConnectionError),

    /// The broker did not acknowledge within the deadline. The command may
    /// or may not have been delivered; the caller decides whether to retry.
    #[error("no acknowledgment within {0:?}")]
    AckTimeout(Duration),

    #[error("message {0} is still awaiting acknowledgment")]
    ReceiptOutstanding(u16),
}

/// Transport events the tracker cares about, extracted from the event
/// loop stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEvent {
    /// The packet left with this id (`Outgoing::Publish`).
    Sent(u16),
    /// The broker acknowledged this id (`PubAck`).
    Acked(u16),
}

impl AckEvent {
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Outgoing(Outgoing::Publish(pkid)) => Some(AckEvent::Sent(*pkid)),
            Event::Incoming(Packet::PubAck(ack)) => Some(AckEvent::Acked(ack.pkid)),
            _ => None,
        }
    }
}

/// Correlates one outstanding publish with its acknowledgment.
///
/// Holds at most one receipt at a time; an id is never reused while
/// unconfirmed because a second send is rejected until the first receipt
/// is confirmed or abandoned.
#[derive(Debug, Default)]
pub struct AckTracker {
    outstanding: Option<u16>,
}

impl AckTracker {
    pub fn observe(&mut self, event: AckEvent) -> Result<Option<DeliveryReceipt>, CommandError> {
        match event {
            AckEvent::Sent(id) => {
                if let Some(pending) = self.outstanding {
                    return Err(CommandError::ReceiptOutstanding(pending));
                }
                self.outstanding = Some(id);
                Ok(None)
            }
            AckEvent::Acked(id) => {
                if self.outstanding == Some(id) {
                    self.outstanding = None;
                    Ok(Some(DeliveryReceipt {
                        message_id: id,
                        confirmed: true,
                    }))
                } else {
                    // An ack for a packet we are not waiting on; QoS 1
                    // permits duplicates of earlier traffic.
                    Ok(None)
                }
            }
        }
    }

    /// Retires the outstanding receipt without confirmation.
    pub fn abandon(&mut self) -> Option<u16> {
        self.outstanding.take()
    }

    pub fn outstanding(&self) -> Option<u16> {
        self.outstanding
    }
}

/// One session dedicated to publishing commands with confirmation.
pub struct CommandChannel {
    session: MqttSession,
    tracker: AckTracker,
    config: CommandConfig,
}

impl CommandChannel {
    pub async fn connect(broker: &BrokerConfig, config: CommandConfig) -> Result<Self, CommandError> {
        let session = MqttSession::connect(broker, &config.client_id).await?;
        Ok(CommandChannel {
            session,
            tracker: AckTracker::default(),
            config,
        })
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    /// Publishes `payload` to `address` at QoS 1 and blocks the calling
    /// task until the broker's ack or the configured timeout.
    pub async fn send(
        &mut self,
        address: &Address,
        payload: &str,
    ) -> Result<DeliveryReceipt, CommandError> {
        if let Some(pending) = self.tracker.outstanding() {
            return Err(CommandError::ReceiptOutstanding(pending));
        }
        let topic = address.encode()?;
        let ack_timeout = Duration::from_secs(self.config.ack_timeout_secs);

        self.session
            .client
            .publish(&topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await?;
        info!(%topic, command = %payload, "command published, awaiting ack");

        let deadline = tokio::time::Instant::now() + ack_timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, self.session.eventloop.poll()).await
            {
                Ok(polled) => polled?,
                Err(_) => {
                    if let Some(id) = self.tracker.abandon() {
                        warn!(message_id = id, "abandoning unconfirmed command");
                    }
                    return Err(CommandError::AckTimeout(ack_timeout));
                }
            };
            if let Some(ack_event) = AckEvent::from_event(&event) {
                if let Some(receipt) = self.tracker.observe(ack_event)? {
                    info!(message_id = receipt.message_id, "command acknowledged");
                    return Ok(receipt);
                }
            }
        }
    }

    /// Sends the MQTT DISCONNECT packet and flushes it.
    pub async fn disconnect(mut self) {
        self.session.disconnect().await;
        let _ = self.session.eventloop.poll().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_before_timeout_confirms_receipt() {
        let mut tracker = AckTracker::default();
        assert_eq!(tracker.observe(AckEvent::Sent(3)).unwrap(), None);
        assert_eq!(tracker.outstanding(), Some(3));

        let receipt = tracker.observe(AckEvent::Acked(3)).unwrap().unwrap();
        assert_eq!(
            receipt,
            DeliveryReceipt {
                message_id: 3,
                confirmed: true
            }
        );
        assert_eq!(tracker.outstanding(), None);
    }

    #[test]
    fn foreign_ack_is_ignored() {
        let mut tracker = AckTracker::default();
        tracker.observe(AckEvent::Sent(3)).unwrap();
        assert_eq!(tracker.observe(AckEvent::Acked(7)).unwrap(), None);
        assert_eq!(tracker.outstanding(), Some(3));
    }

    #[test]
    fn second_send_while_unconfirmed_is_rejected() {
        let mut tracker = AckTracker::default();
        tracker.observe(AckEvent::Sent(3)).unwrap();
        assert!(matches!(
            tracker.observe(AckEvent::Sent(4)),
            Err(CommandError::ReceiptOutstanding(3))
        ));
    }

    #[test]
    fn abandon_leaves_no_dangling_receipt() {
        let mut tracker = AckTracker::default();
        tracker.observe(AckEvent::Sent(9)).unwrap();
        assert_eq!(tracker.abandon(), Some(9));
        assert_eq!(tracker.outstanding(), None);

        // A late ack after abandonment is not a receipt.
        assert_eq!(tracker.observe(AckEvent::Acked(9)).unwrap(), None);
    }

    #[test]
    fn ack_events_extracted_from_transport_stream() {
        let outgoing = Event::Outgoing(Outgoing::Publish(5));
        assert_eq!(AckEvent::from_event(&outgoing), Some(AckEvent::Sent(5)));

        let acked = Event::Incoming(Packet::PubAck(rumqttc::mqttbytes::v4::PubAck { pkid: 5 }));
        assert_eq!(AckEvent::from_event(&acked), Some(AckEvent::Acked(5)));

        let ping = Event::Outgoing(Outgoing::PingReq);
        assert_eq!(AckEvent::from_event(&ping), None);
    }
}
