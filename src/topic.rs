//! Hierarchical topic addressing for the telemetry bus.
//!
//! Every message on the bus lives under a four-segment topic:
//!
//! ```text
//! <namespace>/<user_id>/<device_id>/<sensor_or_cmd>
//! ```
//!
//! e.g. `system_iot/user_001/esp32_sim/gps` for telemetry and
//! `system_iot/user_001/esp32/cmd` for the command channel. The codec here
//! is the single source of truth for that layout: publishers encode an
//! [`Address`] into a topic string, the monitor decodes incoming topic
//! strings back into addresses and demultiplexes on the result. A topic
//! that does not decode is not an error condition for the bus as a whole —
//! the monitor falls back to raw display — so decoding returns a typed
//! result instead of trusting segment positions.

use thiserror::Error;

/// Default topic namespace shared by all fleet devices.
pub const NAMESPACE: &str = "system_iot";

/// Wire spelling of the command segment.
pub const COMMAND_SEGMENT: &str = "cmd";

/// Errors raised while encoding an [`Address`] into a topic string.
///
/// These are construction-time failures: they are surfaced before any
/// network I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address segment is empty")]
    EmptySegment,

    #[error("address segment {0:?} contains '/'")]
    SlashInSegment(String),

    #[error("address segment {0:?} contains an MQTT wildcard")]
    WildcardInSegment(String),

    /// A sensor segment spelled `cmd` would alias the command channel and
    /// break the decode round trip.
    #[error("sensor segment must not be the reserved word \"cmd\"")]
    ReservedSegment,
}

/// Errors raised while decoding a raw topic string.
///
/// Decode failures are recoverable by design: the monitor routes the
/// message to its raw fallback handler and keeps listening.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicParseError {
    #[error("expected 4 topic segments, found {0}")]
    SegmentCount(usize),

    #[error("topic segment {0} is empty")]
    EmptySegment(usize),
}

/// Interpretation of the fourth topic segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// The literal `cmd` — the device's inbound command channel.
    Command,
    /// Any other value names a sensor kind (`gps`, `battery`, `acc`, ...).
    Sensor(String),
}

impl Segment {
    fn as_str(&self) -> &str {
        match self {
            Segment::Command => COMMAND_SEGMENT,
            Segment::Sensor(kind) => kind,
        }
    }
}

/// A fully qualified bus address: namespace, user, device and channel.
///
/// Serializes to exactly four `/`-separated segments; decoding a
/// well-formed topic reproduces the address that encoded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub namespace: String,
    pub user_id: String,
    pub device_id: String,
    pub segment: Segment,
}

impl Address {
    /// Telemetry address for one sensor channel of a device.
    pub fn sensor(
        namespace: impl Into<String>,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Address {
            namespace: namespace.into(),
            user_id: user_id.into(),
            device_id: device_id.into(),
            segment: Segment::Sensor(kind.into()),
        }
    }

    /// Command address for a device.
    pub fn command(
        namespace: impl Into<String>,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Address {
            namespace: namespace.into(),
            user_id: user_id.into(),
            device_id: device_id.into(),
            segment: Segment::Command,
        }
    }

    /// Encodes the address into its wire topic string.
    pub fn encode(&self) -> Result<String, AddressError> {
        if let Segment::Sensor(kind) = &self.segment {
            if kind == COMMAND_SEGMENT {
                return Err(AddressError::ReservedSegment);
            }
        }
        let segments = [
            self.namespace.as_str(),
            self.user_id.as_str(),
            self.device_id.as_str(),
            self.segment.as_str(),
        ];
        for segment in segments {
            validate_segment(segment)?;
        }
        Ok(segments.join("/"))
    }

    /// Decodes a raw topic string into an address.
    ///
    /// Succeeds only for exactly four non-empty segments; anything else is
    /// a [`TopicParseError`] and the caller decides how to degrade.
    pub fn decode(topic: &str) -> Result<Self, TopicParseError> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() != 4 {
            return Err(TopicParseError::SegmentCount(segments.len()));
        }
        if let Some(position) = segments.iter().position(|s| s.is_empty()) {
            return Err(TopicParseError::EmptySegment(position));
        }
        let segment = if segments[3] == COMMAND_SEGMENT {
            Segment::Command
        } else {
            Segment::Sensor(segments[3].to_string())
        };
        Ok(Address {
            namespace: segments[0].to_string(),
            user_id: segments[1].to_string(),
            device_id: segments[2].to_string(),
            segment,
        })
    }
}

fn validate_segment(segment: &str) -> Result<(), AddressError> {
    if segment.is_empty() {
        return Err(AddressError::EmptySegment);
    }
    if segment.contains('/') {
        return Err(AddressError::SlashInSegment(segment.to_string()));
    }
    if segment.contains('+') || segment.contains('#') {
        return Err(AddressError::WildcardInSegment(segment.to_string()));
    }
    Ok(())
}

/// Single wildcard pattern covering every device under a namespace:
/// `<namespace>/+/+/+`. This is the monitor's one and only subscription.
pub fn subscription_pattern(namespace: &str) -> String {
    format!("{namespace}/+/+/+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_sensor_address() {
        let address = Address::sensor(NAMESPACE, "user_001", "esp32_sim", "gps");
        assert_eq!(address.encode().unwrap(), "system_iot/user_001/esp32_sim/gps");
    }

    #[test]
    fn encodes_command_address() {
        let address = Address::command(NAMESPACE, "user_001", "esp32");
        assert_eq!(address.encode().unwrap(), "system_iot/user_001/esp32/cmd");
    }

    #[test]
    fn decode_reverses_encode() {
        let addresses = [
            Address::sensor(NAMESPACE, "user_001", "esp32_sim", "battery"),
            Address::sensor("other_ns", "user_042", "esp32", "acc"),
            Address::command(NAMESPACE, "user_001", "esp32"),
        ];
        for address in addresses {
            let topic = address.encode().unwrap();
            assert_eq!(Address::decode(&topic).unwrap(), address);
        }
    }

    #[test]
    fn decode_routes_cmd_segment_to_command() {
        let address = Address::decode("system_iot/user_001/esp32/cmd").unwrap();
        assert_eq!(address.segment, Segment::Command);
    }

    #[test]
    fn decode_rejects_wrong_segment_count() {
        assert_eq!(
            Address::decode("bad/topic"),
            Err(TopicParseError::SegmentCount(2))
        );
        assert_eq!(
            Address::decode("a/b/c/d/e"),
            Err(TopicParseError::SegmentCount(5))
        );
    }

    #[test]
    fn decode_rejects_empty_segments() {
        assert_eq!(
            Address::decode("system_iot//esp32/gps"),
            Err(TopicParseError::EmptySegment(1))
        );
        assert_eq!(
            Address::decode("system_iot/user_001/esp32/"),
            Err(TopicParseError::EmptySegment(3))
        );
    }

    #[test]
    fn encode_rejects_malformed_segments() {
        let empty = Address::sensor(NAMESPACE, "", "esp32", "gps");
        assert_eq!(empty.encode(), Err(AddressError::EmptySegment));

        let slashed = Address::sensor(NAMESPACE, "user/001", "esp32", "gps");
        assert_eq!(
            slashed.encode(),
            Err(AddressError::SlashInSegment("user/001".into()))
        );

        let wildcard = Address::sensor(NAMESPACE, "user_001", "+", "gps");
        assert_eq!(
            wildcard.encode(),
            Err(AddressError::WildcardInSegment("+".into()))
        );

        let reserved = Address::sensor(NAMESPACE, "user_001", "esp32", "cmd");
        assert_eq!(reserved.encode(), Err(AddressError::ReservedSegment));
    }

    #[test]
    fn wildcard_pattern_matches_namespace() {
        assert_eq!(subscription_pattern(NAMESPACE), "system_iot/+/+/+");
    }
}
