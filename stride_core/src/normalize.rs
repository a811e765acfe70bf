//! Position Normalizer - raw payloads of unknown shape to [`Position`].
//!
//! Two shapes are recognized, tried in order:
//!
//! ```text
//! (a) device   { "coords": { "latitude", "longitude", "accuracy"?, "speed"? }, "timestamp" }
//! (b) flat     { "latitude": <number>, "longitude", "accuracy"?, "speed"?, "timestamp"? }
//! ```
//!
//! Anything else yields `None`, which callers treat as "ignore this sample".

use crate::position::Position;
use serde_json::Value;

/// Accuracy assumed for device-shaped payloads that do not report one.
pub const DEVICE_DEFAULT_ACCURACY_M: f64 = 10.0;

/// Accuracy assumed for flat payloads that do not report one.
pub const FLAT_DEFAULT_ACCURACY_M: f64 = 5.0;

/// Converts a raw payload into a [`Position`].
///
/// `now_ms` is used as the timestamp of flat payloads that carry none.
pub fn normalize(raw: &Value, now_ms: i64) -> Option<Position> {
    if let Some(coords) = raw.get("coords").filter(|c| c.is_object()) {
        return from_coords(coords, raw.get("timestamp"));
    }

    if raw.get("latitude").map_or(false, Value::is_number) {
        return from_flat(raw, now_ms);
    }

    None
}

fn from_coords(coords: &Value, timestamp: Option<&Value>) -> Option<Position> {
    let latitude = coords.get("latitude")?.as_f64()?;
    let longitude = coords.get("longitude")?.as_f64()?;
    let timestamp = timestamp.and_then(as_millis)?;

    Some(Position {
        latitude,
        longitude,
        accuracy: reported_accuracy(coords).unwrap_or(DEVICE_DEFAULT_ACCURACY_M),
        speed: coords.get("speed").and_then(Value::as_f64),
        timestamp,
    })
}

fn from_flat(raw: &Value, now_ms: i64) -> Option<Position> {
    let latitude = raw.get("latitude")?.as_f64()?;
    let longitude = raw.get("longitude")?.as_f64()?;

    Some(Position {
        latitude,
        longitude,
        accuracy: reported_accuracy(raw).unwrap_or(FLAT_DEFAULT_ACCURACY_M),
        speed: raw.get("speed").and_then(Value::as_f64),
        timestamp: raw
            .get("timestamp")
            .and_then(as_millis)
            .filter(|ts| *ts != 0)
            .unwrap_or(now_ms),
    })
}

/// A zero accuracy counts as "not reported".
fn reported_accuracy(obj: &Value) -> Option<f64> {
    obj.get("accuracy")
        .and_then(Value::as_f64)
        .filter(|acc| *acc != 0.0)
}

fn as_millis(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_704_067_200_000;

    #[test]
    fn test_device_shape() {
        let raw = json!({
            "coords": { "latitude": 50.45, "longitude": 30.52, "accuracy": 7.5, "speed": 2.8 },
            "timestamp": 1000
        });

        let pos = normalize(&raw, NOW).unwrap();
        assert_eq!(pos.latitude, 50.45);
        assert_eq!(pos.longitude, 30.52);
        assert_eq!(pos.accuracy, 7.5);
        assert_eq!(pos.speed, Some(2.8));
        assert_eq!(pos.timestamp, 1000);
    }

    #[test]
    fn test_device_shape_defaults() {
        let raw = json!({
            "coords": { "latitude": 50.0, "longitude": 30.0, "speed": null },
            "timestamp": 1000.0
        });

        let pos = normalize(&raw, NOW).unwrap();
        assert_eq!(pos.accuracy, DEVICE_DEFAULT_ACCURACY_M);
        assert_eq!(pos.speed, None);
        assert_eq!(pos.timestamp, 1000);

        let zero_acc = json!({
            "coords": { "latitude": 50.0, "longitude": 30.0, "accuracy": 0 },
            "timestamp": 1
        });
        assert_eq!(normalize(&zero_acc, NOW).unwrap().accuracy, 10.0);
    }

    #[test]
    fn test_device_shape_without_timestamp_is_unrecognized() {
        let raw = json!({ "coords": { "latitude": 50.0, "longitude": 30.0 } });
        assert_eq!(normalize(&raw, NOW), None);
    }

    #[test]
    fn test_flat_shape_defaults() {
        let raw = json!({ "latitude": 50.0, "longitude": 30.0 });

        let pos = normalize(&raw, NOW).unwrap();
        assert_eq!(pos.accuracy, FLAT_DEFAULT_ACCURACY_M);
        assert_eq!(pos.timestamp, NOW);
        assert_eq!(pos.speed, None);
    }

    #[test]
    fn test_flat_shape_keeps_reported_fields() {
        let raw = json!({ "latitude": 50.0, "longitude": 30.0, "accuracy": 12.0, "timestamp": 42 });

        let pos = normalize(&raw, NOW).unwrap();
        assert_eq!(pos.accuracy, 12.0);
        assert_eq!(pos.timestamp, 42);
    }

    #[test]
    fn test_nested_shape_wins_over_flat() {
        let raw = json!({
            "coords": { "latitude": 1.0, "longitude": 2.0 },
            "latitude": 9.0, "longitude": 9.0,
            "timestamp": 5
        });

        let pos = normalize(&raw, NOW).unwrap();
        assert_eq!(pos.latitude, 1.0);
        assert_eq!(pos.accuracy, DEVICE_DEFAULT_ACCURACY_M);
    }

    #[test]
    fn test_unrecognized_inputs() {
        for raw in [
            Value::Null,
            json!(42),
            json!("50.0,30.0"),
            json!({}),
            json!({ "latitude": "50.0", "longitude": 30.0 }),
            json!({ "coords": { "latitude": "x", "longitude": 30.0 }, "timestamp": 1 }),
            json!({ "lat": 50.0, "lng": 30.0 }),
        ] {
            assert_eq!(normalize(&raw, NOW), None, "expected None for {raw}");
        }
    }
}
