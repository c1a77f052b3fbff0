//! A single authenticated broker connection.
//!
//! [`MqttSession::connect`] performs the full handshake: it builds the
//! client, drives the event loop until the broker's ConnAck arrives and
//! classifies the outcome. Every bus role (publisher, monitor, command
//! channel) owns one session exclusively; after the handshake the role's
//! own loop keeps polling the event loop it took over from here.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Broker endpoint and credentials, one section of the TOML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: "myuser".to_string(),
            password: "1234".to_string(),
            keep_alive_secs: 5,
            connect_timeout_secs: 10,
        }
    }
}

/// Lifecycle of a session's underlying connection.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Failures while establishing or holding a broker connection.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network-level failure: broker unreachable, connection dropped.
    #[error("broker connection failed: {0}")]
    Connect(#[from] ConnectionError),

    /// The broker rejected our credentials. Fatal, never retried here.
    #[error("broker rejected credentials: {0:?}")]
    Auth(ConnectReturnCode),

    /// The broker refused the connection for a non-credential reason.
    #[error("broker refused connection: {0:?}")]
    Refused(ConnectReturnCode),

    #[error("no ConnAck from broker within {0:?}")]
    ConnectTimeout(Duration),
}

/// One exclusive broker connection: the client half for issuing requests
/// and the event loop half that must keep being polled by the owner.
pub struct MqttSession {
    pub client: AsyncClient,
    pub eventloop: EventLoop,
    state: ConnectionState,
}

impl MqttSession {
    /// Connects and authenticates, returning only once the broker has
    /// acknowledged the session.
    pub async fn connect(broker: &BrokerConfig, client_id: &str) -> Result<Self, SessionError> {
        let mut options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
        options
            .set_credentials(broker.username.clone(), broker.password.clone())
            .set_keep_alive(Duration::from_secs(broker.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, 64);
        let mut session = MqttSession {
            client,
            eventloop,
            state: ConnectionState::Connecting,
        };

        info!(
            host = %broker.host,
            port = broker.port,
            client_id,
            "connecting to broker"
        );
        let timeout = Duration::from_secs(broker.connect_timeout_secs);
        match tokio::time::timeout(timeout, session.await_connack()).await {
            Ok(Ok(())) => {
                session.state = ConnectionState::Connected;
                info!(client_id, "broker acknowledged session");
                Ok(session)
            }
            Ok(Err(e)) => {
                session.state = ConnectionState::Disconnected;
                Err(e)
            }
            Err(_) => {
                session.state = ConnectionState::Disconnected;
                Err(SessionError::ConnectTimeout(timeout))
            }
        }
    }

    async fn await_connack(&mut self) -> Result<(), SessionError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        ConnectReturnCode::BadUserNamePassword
                        | ConnectReturnCode::NotAuthorized => Err(SessionError::Auth(ack.code)),
                        code => Err(SessionError::Refused(code)),
                    };
                }
                Ok(event) => debug!(?event, "pre-connack event"),
                Err(ConnectionError::ConnectionRefused(code)) => {
                    return match code {
                        ConnectReturnCode::BadUserNamePassword
                        | ConnectReturnCode::NotAuthorized => Err(SessionError::Auth(code)),
                        code => Err(SessionError::Refused(code)),
                    };
                }
                Err(e) => return Err(SessionError::Connect(e)),
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Sends the MQTT DISCONNECT packet. The event loop should be polled
    /// once more afterwards so the packet is flushed.
    pub async fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        if let Err(e) = self.client.disconnect().await {
            debug!("disconnect request failed: {e}");
        }
    }
}
