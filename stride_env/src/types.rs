//! Common types shared by position sources and their consumers.

use crate::error::SourceError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which producer a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrigin {
    /// Real positioning hardware
    Device,

    /// Synthetic GPS (development and testing)
    Simulated,
}

impl SampleOrigin {
    /// Returns true for simulated samples.
    pub fn is_simulated(&self) -> bool {
        matches!(self, SampleOrigin::Simulated)
    }
}

impl std::fmt::Display for SampleOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleOrigin::Device => write!(f, "device"),
            SampleOrigin::Simulated => write!(f, "simulated"),
        }
    }
}

/// A raw position event of unknown shape, tagged with its origin.
///
/// The payload is kept as JSON because producers disagree on layout:
/// device payloads nest coordinates under `coords`, other producers send
/// flat records. Normalization happens in the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Payload as emitted by the producer
    pub payload: serde_json::Value,

    /// Producer of this sample
    pub origin: SampleOrigin,
}

impl RawSample {
    /// Creates a device-originated sample.
    pub fn device(payload: serde_json::Value) -> Self {
        Self {
            payload,
            origin: SampleOrigin::Device,
        }
    }

    /// Creates a simulated sample.
    pub fn simulated(payload: serde_json::Value) -> Self {
        Self {
            payload,
            origin: SampleOrigin::Simulated,
        }
    }
}

/// Message delivered from a source to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A new raw position sample
    Sample(RawSample),

    /// The source reported a failure
    Error(SourceError),

    /// A simulated source stopped emitting
    SimulationEnded,
}

/// Callback channel a source pushes its events into.
pub type SampleSink = Arc<dyn Fn(SourceEvent) + Send + Sync>;

/// Handle returned by [`crate::PositionSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// Options passed to a position source when subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Prefer GNSS over coarse network positioning
    pub high_accuracy: bool,

    /// Oldest cached fix the caller will accept (0 = never cached)
    pub maximum_age_ms: u64,

    /// How long the platform may take to produce a fix
    pub timeout_ms: u64,
}

impl WatchOptions {
    /// Options for a continuous tracking subscription.
    pub fn continuous() -> Self {
        Self {
            high_accuracy: true,
            maximum_age_ms: 0,
            timeout_ms: 20_000,
        }
    }

    /// Options for a one-shot position request.
    pub fn one_shot() -> Self {
        Self {
            high_accuracy: true,
            maximum_age_ms: 0,
            timeout_ms: 5_000,
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::continuous()
    }
}

/// Coordinates block of a device-shaped payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// A payload shaped like a platform geolocation event.
///
/// Producers build one of these and send it as JSON, e.g.
///
/// ```text
/// { "coords": { "latitude": 50.45, "longitude": 30.52, "accuracy": 5.0 },
///   "timestamp": 1704067200000 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeolocationPayload {
    pub coords: Coords,
    pub timestamp: i64,
}

impl GeolocationPayload {
    /// Creates a payload with only coordinates, accuracy and timestamp set.
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Self {
        Self {
            coords: Coords {
                latitude,
                longitude,
                accuracy: Some(accuracy),
                altitude: None,
                heading: None,
                speed: None,
            },
            timestamp,
        }
    }

    /// Sets the reported ground speed (m/s).
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.coords.speed = Some(speed_mps);
        self
    }

    /// Converts to the JSON form carried by [`RawSample`].
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_json_shape() {
        let payload = GeolocationPayload::new(50.0, 30.0, 5.0, 1000).with_speed(2.5);
        let value = payload.to_value();

        assert_eq!(value["coords"]["latitude"], 50.0);
        assert_eq!(value["coords"]["speed"], 2.5);
        assert_eq!(value["timestamp"], 1000);
        // Unset optional fields are omitted rather than null
        assert!(value["coords"].get("altitude").is_none());
    }

    #[test]
    fn test_watch_options_presets() {
        let watch = WatchOptions::continuous();
        assert!(watch.high_accuracy);
        assert_eq!(watch.maximum_age_ms, 0);
        assert_eq!(watch.timeout_ms, 20_000);

        assert_eq!(WatchOptions::one_shot().timeout_ms, 5_000);
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(SampleOrigin::Device.to_string(), "device");
        assert!(SampleOrigin::Simulated.is_simulated());
    }
}
