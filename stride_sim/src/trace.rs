//! Ground truth runner and noisy device fix generation.
//!
//! A `DeviceTrace` maintains the "true" path of a runner:
//! - Constant speed along a fixed heading (speed may be changed mid-run)
//! - Fixes with Gaussian position noise and a spread of reported accuracy
//! - Occasional low-accuracy fixes and far-off outlier jumps

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use stride_core::position::destination_point;
use stride_core::Position;
use stride_env::GeolocationPayload;

/// Configuration for a simulated device trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub origin_lat: f64,
    pub origin_lng: f64,

    /// Degrees clockwise from north
    pub heading_deg: f64,

    pub speed_mps: f64,

    /// Time between fixes
    pub interval_ms: u64,

    /// Position noise standard deviation per axis (meters)
    pub noise_std_m: f64,

    /// Reported accuracy of a normal fix, mean and spread (meters)
    pub accuracy_mean_m: f64,
    pub accuracy_std_m: f64,

    /// Chance that a fix reports a poor accuracy radius
    pub low_accuracy_probability: f64,
    pub low_accuracy_m: f64,

    /// Chance that a fix lands far away from the runner
    pub outlier_probability: f64,
    pub outlier_distance_m: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            origin_lat: 50.4501,
            origin_lng: 30.5234,
            heading_deg: 0.0,
            speed_mps: 3.0,
            interval_ms: 2000,
            noise_std_m: 1.0,
            accuracy_mean_m: 6.0,
            accuracy_std_m: 2.0,
            low_accuracy_probability: 0.05,
            low_accuracy_m: 80.0,
            outlier_probability: 0.03,
            outlier_distance_m: 800.0,
        }
    }
}

impl TraceConfig {
    pub fn with_origin(mut self, lat: f64, lng: f64) -> Self {
        self.origin_lat = lat;
        self.origin_lng = lng;
        self
    }

    pub fn with_heading(mut self, heading_deg: f64) -> Self {
        self.heading_deg = heading_deg;
        self
    }

    /// Disables noise, poor-accuracy fixes and outliers.
    pub fn clean(mut self) -> Self {
        self.noise_std_m = 0.0;
        self.accuracy_std_m = 0.0;
        self.low_accuracy_probability = 0.0;
        self.outlier_probability = 0.0;
        self
    }
}

/// What kind of fix the trace produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixKind {
    Normal,
    LowAccuracy,
    Outlier,
}

/// A generated fix along with the truth it was derived from.
#[derive(Debug, Clone, Copy)]
pub struct TraceFix {
    pub payload: GeolocationPayload,
    pub truth: Position,
    pub kind: FixKind,
}

/// The ground truth runner.
pub struct DeviceTrace {
    config: TraceConfig,
    rng: ChaCha8Rng,
    truth: Position,
    speed_mps: f64,
    fixes: u64,
    truth_distance_m: f64,
}

impl DeviceTrace {
    /// Creates a trace whose randomness is fully determined by `seed`.
    pub fn new(config: TraceConfig, seed: u64) -> Self {
        Self::with_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn with_rng(config: TraceConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            rng,
            truth: Position::new(config.origin_lat, config.origin_lng, 0.0, 0),
            speed_mps: config.speed_mps,
            fixes: 0,
            truth_distance_m: 0.0,
        }
    }

    /// Changes the runner's speed from the next step on (0 = standing).
    pub fn set_speed(&mut self, speed_mps: f64) {
        self.speed_mps = speed_mps.max(0.0);
    }

    /// Advances the runner by one interval.
    pub fn step(&mut self) {
        let dt = self.config.interval_ms as f64 / 1000.0;
        let distance = self.speed_mps * dt;
        if distance > 0.0 {
            self.truth = self.truth.destination(self.config.heading_deg, distance);
            self.truth_distance_m += distance;
        }
    }

    /// Generates the fix the device reports for the current truth.
    ///
    /// The first fix of a trace is never an outlier.
    pub fn fix(&mut self, timestamp_ms: i64) -> TraceFix {
        self.fixes += 1;
        let roll: f64 = self.rng.gen();

        let kind = if self.fixes > 1 && roll < self.config.outlier_probability {
            FixKind::Outlier
        } else if roll < self.config.outlier_probability + self.config.low_accuracy_probability {
            FixKind::LowAccuracy
        } else {
            FixKind::Normal
        };

        let (mut lat, mut lng) = (self.truth.latitude, self.truth.longitude);

        if self.config.noise_std_m > 0.0 {
            if let Ok(normal) = Normal::new(0.0, self.config.noise_std_m) {
                let north: f64 = normal.sample(&mut self.rng);
                let east: f64 = normal.sample(&mut self.rng);
                (lat, lng) = destination_point(lat, lng, 0.0, north);
                (lat, lng) = destination_point(lat, lng, 90.0, east);
            }
        }

        if kind == FixKind::Outlier {
            let bearing = self.rng.gen_range(0.0..360.0);
            (lat, lng) = destination_point(lat, lng, bearing, self.config.outlier_distance_m);
        }

        let accuracy = match kind {
            FixKind::LowAccuracy => self.config.low_accuracy_m,
            _ => self.sample_accuracy(),
        };

        let mut payload = GeolocationPayload::new(lat, lng, accuracy, timestamp_ms);
        if self.speed_mps > 0.0 {
            payload = payload.with_speed(self.speed_mps);
        }

        TraceFix {
            payload,
            truth: Position {
                timestamp: timestamp_ms,
                ..self.truth
            },
            kind,
        }
    }

    fn sample_accuracy(&mut self) -> f64 {
        let mean = self.config.accuracy_mean_m;
        let spread = Normal::new(mean, self.config.accuracy_std_m)
            .map(|n| n.sample(&mut self.rng))
            .unwrap_or(mean);
        spread.clamp(2.0, 30.0)
    }

    /// Current true position.
    pub fn truth(&self) -> Position {
        self.truth
    }

    /// Distance the runner actually covered.
    pub fn truth_distance_m(&self) -> f64 {
        self.truth_distance_m
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stride_core::normalize;

    #[test]
    fn test_truth_moves_at_speed() {
        let mut trace = DeviceTrace::new(TraceConfig::default().clean(), 1);
        let start = trace.truth();

        for _ in 0..10 {
            trace.step();
        }

        // 10 steps of 2 s at 3 m/s
        assert_relative_eq!(trace.truth_distance_m(), 60.0, epsilon = 1e-9);
        assert_relative_eq!(start.distance_to(&trace.truth()), 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_standing_still() {
        let mut trace = DeviceTrace::new(TraceConfig::default().clean(), 1);
        trace.set_speed(0.0);
        trace.step();
        assert_eq!(trace.truth_distance_m(), 0.0);
        assert_eq!(trace.fix(0).payload.coords.speed, None);
    }

    #[test]
    fn test_clean_fix_matches_truth() {
        let mut trace = DeviceTrace::new(TraceConfig::default().clean(), 9);
        trace.step();
        let fix = trace.fix(1234);

        assert_eq!(fix.kind, FixKind::Normal);
        assert_eq!(fix.payload.coords.latitude, fix.truth.latitude);
        assert_eq!(fix.payload.coords.accuracy, Some(6.0));

        let pos = normalize(&fix.payload.to_value(), 0).unwrap();
        assert_eq!(pos.timestamp, 1234);
    }

    #[test]
    fn test_outliers_are_far_and_first_fix_clean() {
        let config = TraceConfig {
            outlier_probability: 1.0,
            low_accuracy_probability: 0.0,
            noise_std_m: 0.0,
            ..TraceConfig::default()
        };
        let mut trace = DeviceTrace::new(config, 4);

        assert_ne!(trace.fix(0).kind, FixKind::Outlier);

        let fix = trace.fix(1);
        assert_eq!(fix.kind, FixKind::Outlier);
        let reported = Position::new(fix.payload.coords.latitude, fix.payload.coords.longitude, 0.0, 0);
        assert_relative_eq!(reported.distance_to(&fix.truth), 800.0, epsilon = 1e-6);
    }

    #[test]
    fn test_same_seed_same_trace() {
        let mut a = DeviceTrace::new(TraceConfig::default(), 77);
        let mut b = DeviceTrace::new(TraceConfig::default(), 77);

        for ts in 0..20 {
            a.step();
            b.step();
            assert_eq!(a.fix(ts).payload, b.fix(ts).payload);
        }
    }
}
