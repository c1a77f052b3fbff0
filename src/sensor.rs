//! Sensor kinds, readings and the simulated emitter.
//!
//! A reading is created once per publisher tick, serialized to its wire
//! payload and discarded. Each kind has one canonical encoding:
//!
//! - GPS: JSON object `{"lat":..,"lon":..,"sats":..}`
//! - battery: `"<voltage>V"` with two decimals, e.g. `3.87V`
//! - accelerometer: `"x:<f>,y:<f>,z:<f>"` with three decimals per axis
//!
//! The matching [`SensorReading::parse`] exists so the formats stay
//! symmetric and testable even though the monitor only displays payload
//! text today.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use thiserror::Error;

/// The sensor channels a device can report on.
///
/// The serde spelling doubles as the topic segment, so configuration files
/// and the wire format never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Gps,
    Battery,
    Acc,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Gps => "gps",
            SensorKind::Battery => "battery",
            SensorKind::Acc => "acc",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = ReadingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gps" => Ok(SensorKind::Gps),
            "battery" => Ok(SensorKind::Battery),
            "acc" => Ok(SensorKind::Acc),
            other => Err(ReadingError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadingError {
    #[error("unknown sensor kind {0:?}")]
    UnknownKind(String),

    #[error("malformed {kind} payload {payload:?}")]
    Malformed { kind: SensorKind, payload: String },
}

/// GPS wire payload; field order here is the wire order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct GpsFix {
    lat: f64,
    lon: f64,
    sats: u32,
}

/// One sampled reading, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    Gps { lat: f64, lon: f64, sats: u32 },
    Battery { voltage: f64 },
    Acc { x: f64, y: f64, z: f64 },
}

impl SensorReading {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorReading::Gps { .. } => SensorKind::Gps,
            SensorReading::Battery { .. } => SensorKind::Battery,
            SensorReading::Acc { .. } => SensorKind::Acc,
        }
    }

    /// Canonical wire encoding for this reading.
    pub fn serialize(&self) -> String {
        match *self {
            SensorReading::Gps { lat, lon, sats } => {
                // GpsFix is plain data; serialization cannot fail.
                serde_json::to_string(&GpsFix { lat, lon, sats })
                    .unwrap_or_default()
            }
            SensorReading::Battery { voltage } => format!("{voltage:.2}V"),
            SensorReading::Acc { x, y, z } => format!("x:{x:.3},y:{y:.3},z:{z:.3}"),
        }
    }

    /// Decodes a wire payload back into a reading.
    pub fn parse(kind: SensorKind, payload: &str) -> Result<Self, ReadingError> {
        let malformed = || ReadingError::Malformed {
            kind,
            payload: payload.to_string(),
        };
        match kind {
            SensorKind::Gps => {
                let fix: GpsFix = serde_json::from_str(payload).map_err(|_| malformed())?;
                Ok(SensorReading::Gps {
                    lat: fix.lat,
                    lon: fix.lon,
                    sats: fix.sats,
                })
            }
            SensorKind::Battery => {
                let voltage = payload
                    .strip_suffix('V')
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(malformed)?;
                Ok(SensorReading::Battery { voltage })
            }
            SensorKind::Acc => {
                let mut axes = [0.0; 3];
                let mut parts = payload.split(',');
                for (axis, label) in axes.iter_mut().zip(["x:", "y:", "z:"]) {
                    *axis = parts
                        .next()
                        .and_then(|p| p.strip_prefix(label))
                        .and_then(|v| v.parse().ok())
                        .ok_or_else(malformed)?;
                }
                if parts.next().is_some() {
                    return Err(malformed());
                }
                Ok(SensorReading::Acc {
                    x: axes[0],
                    y: axes[1],
                    z: axes[2],
                })
            }
        }
    }
}

/// Bounding box the simulated GPS wanders inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterConfig {
    pub lat_range: (f64, f64),
    pub lon_range: (f64, f64),
}

impl Default for EmitterConfig {
    fn default() -> Self {
        // Rough bounding box of Poland, where the reference fleet roams.
        EmitterConfig {
            lat_range: (49.0, 54.8),
            lon_range: (14.1, 24.1),
        }
    }
}

/// Synthesizes readings for the simulated device.
///
/// The output shape per kind is fixed; only the sampled values vary. A
/// real device would replace this with hardware sampling behind the same
/// signature.
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    config: EmitterConfig,
}

impl Emitter {
    pub fn new(config: EmitterConfig) -> Self {
        Emitter { config }
    }

    pub fn sample(&self, kind: SensorKind) -> SensorReading {
        let mut rng = rand::thread_rng();
        match kind {
            SensorKind::Gps => SensorReading::Gps {
                lat: rng.gen_range(range(self.config.lat_range)),
                lon: rng.gen_range(range(self.config.lon_range)),
                sats: rng.gen_range(4..=12),
            },
            SensorKind::Battery => SensorReading::Battery {
                voltage: rng.gen_range(3.70..4.00),
            },
            SensorKind::Acc => SensorReading::Acc {
                x: rng.gen_range(-1.0..1.0),
                y: rng.gen_range(-1.0..1.0),
                z: rng.gen_range(-1.0..1.0),
            },
        }
    }
}

fn range(bounds: (f64, f64)) -> Range<f64> {
    bounds.0..bounds.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_serializes_to_json() {
        let reading = SensorReading::Gps {
            lat: 52.229675,
            lon: 21.01223,
            sats: 8,
        };
        assert_eq!(
            reading.serialize(),
            r#"{"lat":52.229675,"lon":21.01223,"sats":8}"#
        );
    }

    #[test]
    fn battery_serializes_with_volt_suffix() {
        let reading = SensorReading::Battery { voltage: 3.8712 };
        assert_eq!(reading.serialize(), "3.87V");
    }

    #[test]
    fn acc_serializes_three_axis_pairs() {
        let reading = SensorReading::Acc {
            x: 0.25,
            y: -0.5,
            z: 0.9991,
        };
        let payload = reading.serialize();
        assert_eq!(payload, "x:0.250,y:-0.500,z:0.999");
        assert_eq!(payload.split(',').count(), 3);
    }

    #[test]
    fn parse_reverses_serialize() {
        let readings = [
            SensorReading::Gps {
                lat: 50.512345,
                lon: 19.734567,
                sats: 7,
            },
            SensorReading::Battery { voltage: 3.91 },
            SensorReading::Acc {
                x: 0.125,
                y: -0.75,
                z: 0.5,
            },
        ];
        // Sample values chosen to survive the fixed-precision formats.
        for reading in readings {
            let parsed = SensorReading::parse(reading.kind(), &reading.serialize()).unwrap();
            assert_eq!(parsed, reading);
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(SensorReading::parse(SensorKind::Gps, "not json").is_err());
        assert!(SensorReading::parse(SensorKind::Battery, "3.87").is_err());
        assert!(SensorReading::parse(SensorKind::Acc, "x:1.0,y:2.0").is_err());
        assert!(SensorReading::parse(SensorKind::Acc, "x:1,y:2,q:3").is_err());
    }

    #[test]
    fn emitter_samples_stay_in_range() {
        let emitter = Emitter::default();
        for _ in 0..64 {
            match emitter.sample(SensorKind::Gps) {
                SensorReading::Gps { lat, lon, sats } => {
                    assert!((49.0..54.8).contains(&lat));
                    assert!((14.1..24.1).contains(&lon));
                    assert!((4..=12).contains(&sats));
                }
                other => panic!("wrong variant: {other:?}"),
            }
            match emitter.sample(SensorKind::Battery) {
                SensorReading::Battery { voltage } => {
                    assert!((3.70..4.00).contains(&voltage))
                }
                other => panic!("wrong variant: {other:?}"),
            }
            match emitter.sample(SensorKind::Acc) {
                SensorReading::Acc { x, y, z } => {
                    for axis in [x, y, z] {
                        assert!((-1.0..1.0).contains(&axis));
                    }
                }
                other => panic!("wrong variant: {other:?}"),
            }
        }
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [SensorKind::Gps, SensorKind::Battery, SensorKind::Acc] {
            assert_eq!(kind.as_str().parse::<SensorKind>().unwrap(), kind);
        }
        assert!("thermostat".parse::<SensorKind>().is_err());
    }
}
