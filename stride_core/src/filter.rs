//! Position Filter & Accumulator
//! ================================
//!
//! Decides, for every normalized sample, whether it moves the live marker,
//! adds distance, and becomes a route vertex. The gates run in this order:
//!
//! 1. **Source precedence**: device samples are ignored while simulation is active
//! 2. **Accuracy gate**: device samples worse than `max_device_accuracy_m` are dropped
//! 3. **Current position**: survivors always update the live position
//! 4. **Accumulation gate**: nothing below runs unless the session is live
//! 5. **First sample**: seeds the route, no distance
//! 6. **Jump rejection**: deltas above `max_jump_m` are dropped (device) or
//!    trusted without distance (simulated, e.g. loop wraparound)
//! 7. **Micro-movement gate**: device deltas below `min_move_m` are dropped
//! 8. **Route decimation**: accepted samples become vertices only past the
//!    draw threshold from the last stored vertex
//!
//! Rejections are values ([`SampleOutcome::Rejected`]), not errors: GPS noise
//! is expected input.

use crate::position::Position;
use serde::{Deserialize, Serialize};
use stride_env::SampleOrigin;

/// Thresholds for the filter gates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Device samples with a larger accuracy radius are dropped (meters, inclusive bound)
    pub max_device_accuracy_m: f64,

    /// Larger deltas from the last accepted position are GPS jumps (meters)
    pub max_jump_m: f64,

    /// Smaller device deltas are jitter (meters)
    pub min_move_m: f64,

    /// Minimum spacing between device route vertices (meters)
    pub device_draw_threshold_m: f64,

    /// Minimum spacing between simulated route vertices (meters)
    pub simulated_draw_threshold_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_device_accuracy_m: 50.0,
            max_jump_m: 500.0,
            min_move_m: 3.0,
            device_draw_threshold_m: 5.0,
            simulated_draw_threshold_m: 2.0,
        }
    }
}

impl FilterConfig {
    /// Draw threshold applicable to a sample origin.
    pub fn draw_threshold(&self, origin: SampleOrigin) -> f64 {
        match origin {
            SampleOrigin::Device => self.device_draw_threshold_m,
            SampleOrigin::Simulated => self.simulated_draw_threshold_m,
        }
    }
}

/// Session flags the filter consults but does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterGate {
    /// A simulated source is authoritative
    pub simulation_active: bool,

    /// Tracking is active and not paused
    pub accumulating: bool,
}

/// Why a sample was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Device sample while simulation is authoritative
    SimulationActive,

    /// Device accuracy radius above the limit
    LowAccuracy,

    /// Device sample too far from the last accepted position
    Jump,

    /// Device sample too close to the last accepted position
    MicroMovement,
}

/// What the filter did with one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Sample dropped; see the reason for whether the live position moved
    Rejected(RejectReason),

    /// Live position updated, session not accumulating
    Displayed,

    /// First accepted sample of the session; seeded the route
    Started,

    /// Accepted: distance added, possibly appended as a route vertex
    Accepted { added_m: f64, route_appended: bool },

    /// Simulated jump trusted: new reference point and vertex, no distance
    JumpTrusted,
}

impl SampleOutcome {
    /// Returns true if the live position was updated.
    pub fn moved_marker(&self) -> bool {
        !matches!(
            self,
            SampleOutcome::Rejected(RejectReason::SimulationActive | RejectReason::LowAccuracy)
        )
    }

    /// Returns true if route or distance changed.
    pub fn mutated_route(&self) -> bool {
        matches!(
            self,
            SampleOutcome::Started | SampleOutcome::Accepted { .. } | SampleOutcome::JumpTrusted
        )
    }
}

/// Accumulates distance and route vertices for one tracking session.
#[derive(Debug, Clone)]
pub struct RouteAccumulator {
    config: FilterConfig,

    /// Live marker position, updated even when not accumulating
    current: Option<Position>,

    /// Reference point for distance decisions
    last_accepted: Option<Position>,

    /// Stored route vertices
    route: Vec<Position>,

    /// Cumulative distance in meters
    distance_m: f64,
}

impl RouteAccumulator {
    /// Creates an empty accumulator.
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            current: None,
            last_accepted: None,
            route: Vec::new(),
            distance_m: 0.0,
        }
    }

    /// Clears route, distance and reference point for a new session.
    ///
    /// The live position is kept so the map does not blank out.
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.route.clear();
        self.distance_m = 0.0;
    }

    /// Runs one normalized sample through the gates.
    pub fn process(&mut self, sample: Position, origin: SampleOrigin, gate: FilterGate) -> SampleOutcome {
        let simulated = origin.is_simulated();

        if !simulated && gate.simulation_active {
            return SampleOutcome::Rejected(RejectReason::SimulationActive);
        }

        if !simulated && sample.accuracy > self.config.max_device_accuracy_m {
            return SampleOutcome::Rejected(RejectReason::LowAccuracy);
        }

        self.current = Some(sample);

        if !gate.accumulating {
            return SampleOutcome::Displayed;
        }

        let Some(last) = self.last_accepted else {
            self.last_accepted = Some(sample);
            self.route = vec![sample];
            return SampleOutcome::Started;
        };

        let dist = last.distance_to(&sample);

        if dist > self.config.max_jump_m {
            if simulated {
                self.last_accepted = Some(sample);
                self.route.push(sample);
                return SampleOutcome::JumpTrusted;
            }
            return SampleOutcome::Rejected(RejectReason::Jump);
        }

        if !simulated && dist < self.config.min_move_m {
            return SampleOutcome::Rejected(RejectReason::MicroMovement);
        }

        self.distance_m += dist;
        self.last_accepted = Some(sample);

        let route_appended = match self.route.last() {
            Some(vertex) => vertex.distance_to(&sample) >= self.config.draw_threshold(origin),
            None => true,
        };
        if route_appended {
            self.route.push(sample);
        }

        SampleOutcome::Accepted {
            added_m: dist,
            route_appended,
        }
    }

    /// Sets the live position without touching route or distance.
    pub fn set_current(&mut self, position: Position) {
        self.current = Some(position);
    }

    /// Live marker position.
    pub fn current(&self) -> Option<&Position> {
        self.current.as_ref()
    }

    /// Reference point for the next distance decision.
    pub fn last_accepted(&self) -> Option<&Position> {
        self.last_accepted.as_ref()
    }

    /// Stored route vertices in chronological order.
    pub fn route(&self) -> &[Position] {
        &self.route
    }

    /// Cumulative distance in meters.
    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    /// Active thresholds.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

impl Default for RouteAccumulator {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const LIVE: FilterGate = FilterGate {
        simulation_active: false,
        accumulating: true,
    };

    fn at(lat: f64, lon: f64, acc: f64, ts: i64) -> Position {
        Position::new(lat, lon, acc, ts)
    }

    #[test]
    fn test_three_device_samples_scenario() {
        let mut acc = RouteAccumulator::default();

        assert_eq!(acc.process(at(50.0, 30.0, 5.0, 0), SampleOrigin::Device, LIVE), SampleOutcome::Started);
        acc.process(at(50.00005, 30.0, 5.0, 1000), SampleOrigin::Device, LIVE);
        acc.process(at(50.00010, 30.0, 5.0, 2000), SampleOrigin::Device, LIVE);

        assert_relative_eq!(acc.distance_m(), 11.0, epsilon = 0.5);
        assert_eq!(acc.route().len(), 3);
    }

    #[test]
    fn test_accuracy_gate_boundary() {
        let mut acc = RouteAccumulator::default();

        let outcome = acc.process(at(50.0, 30.0, 51.0, 0), SampleOrigin::Device, LIVE);
        assert_eq!(outcome, SampleOutcome::Rejected(RejectReason::LowAccuracy));
        assert!(acc.current().is_none());
        assert!(acc.route().is_empty());

        let outcome = acc.process(at(50.0, 30.0, 50.0, 0), SampleOrigin::Device, LIVE);
        assert_eq!(outcome, SampleOutcome::Started);
        assert!(acc.current().is_some());
    }

    #[test]
    fn test_simulated_bypasses_accuracy_gate() {
        let mut acc = RouteAccumulator::default();
        let outcome = acc.process(at(50.0, 30.0, 500.0, 0), SampleOrigin::Simulated, LIVE);
        assert_eq!(outcome, SampleOutcome::Started);
    }

    #[test]
    fn test_device_jump_discarded_entirely() {
        let mut acc = RouteAccumulator::default();
        let start = at(50.0, 30.0, 5.0, 0);
        acc.process(start, SampleOrigin::Device, LIVE);

        let far = start.destination(90.0, 501.0);
        let outcome = acc.process(far, SampleOrigin::Device, LIVE);

        assert_eq!(outcome, SampleOutcome::Rejected(RejectReason::Jump));
        assert_eq!(acc.last_accepted(), Some(&start));
        assert_eq!(acc.route(), &[start]);
        assert_eq!(acc.distance_m(), 0.0);
        // The live marker still follows the sample
        assert_eq!(acc.current(), Some(&far));
    }

    #[test]
    fn test_simulated_jump_trusted_without_distance() {
        let mut acc = RouteAccumulator::default();
        let start = at(50.0, 30.0, 5.0, 0);
        acc.process(start, SampleOrigin::Simulated, LIVE);

        let far = start.destination(90.0, 501.0);
        let outcome = acc.process(far, SampleOrigin::Simulated, LIVE);

        assert_eq!(outcome, SampleOutcome::JumpTrusted);
        assert_eq!(acc.last_accepted(), Some(&far));
        assert_eq!(acc.route(), &[start, far]);
        assert_eq!(acc.distance_m(), 0.0);
    }

    #[test]
    fn test_micro_movement_gate() {
        let mut acc = RouteAccumulator::default();
        let start = at(50.0, 30.0, 5.0, 0);
        acc.process(start, SampleOrigin::Device, LIVE);

        // ~2.2 m: below the 3 m device gate
        let jitter = at(50.00002, 30.0, 5.0, 1000);
        let outcome = acc.process(jitter, SampleOrigin::Device, LIVE);
        assert_eq!(outcome, SampleOutcome::Rejected(RejectReason::MicroMovement));
        assert_eq!(acc.distance_m(), 0.0);
        assert_eq!(acc.last_accepted(), Some(&start));

        // The same step from the simulator counts
        let outcome = acc.process(jitter, SampleOrigin::Simulated, LIVE);
        assert!(matches!(outcome, SampleOutcome::Accepted { route_appended: true, .. }));
        assert_relative_eq!(acc.distance_m(), 2.2239, epsilon = 1e-3);
    }

    #[test]
    fn test_route_decimation_keeps_distance() {
        let mut acc = RouteAccumulator::default();
        acc.process(at(50.0, 30.0, 5.0, 0), SampleOrigin::Device, LIVE);

        // ~4.4 m: counts toward distance, under the 5 m draw threshold
        let outcome = acc.process(at(50.00004, 30.0, 5.0, 1), SampleOrigin::Device, LIVE);
        assert!(matches!(outcome, SampleOutcome::Accepted { route_appended: false, .. }));
        assert_eq!(acc.route().len(), 1);

        // Another ~4.4 m: 8.9 m from the stored vertex, appended
        let outcome = acc.process(at(50.00008, 30.0, 5.0, 2), SampleOrigin::Device, LIVE);
        assert!(matches!(outcome, SampleOutcome::Accepted { route_appended: true, .. }));
        assert_eq!(acc.route().len(), 2);
        assert_relative_eq!(acc.distance_m(), 8.8956, epsilon = 1e-3);
    }

    #[test]
    fn test_simulated_decimation_uses_smaller_threshold() {
        let mut acc = RouteAccumulator::default();
        acc.process(at(50.0, 30.0, 5.0, 0), SampleOrigin::Simulated, LIVE);

        // ~1.1 m: no micro-movement gate for simulated samples, but under 2 m
        let outcome = acc.process(at(50.00001, 30.0, 5.0, 1), SampleOrigin::Simulated, LIVE);
        assert!(matches!(outcome, SampleOutcome::Accepted { route_appended: false, .. }));
        assert_eq!(acc.route().len(), 1);

        // ~2.2 m from the stored vertex: clears 2 m though not the device 5 m
        let outcome = acc.process(at(50.00002, 30.0, 5.0, 2), SampleOrigin::Simulated, LIVE);
        assert!(matches!(outcome, SampleOutcome::Accepted { route_appended: true, .. }));
        assert_eq!(acc.route().len(), 2);
        assert_relative_eq!(acc.distance_m(), 2.2239, epsilon = 1e-3);
    }

    #[test]
    fn test_simulation_precedence() {
        let mut acc = RouteAccumulator::default();
        let gate = FilterGate {
            simulation_active: true,
            accumulating: true,
        };

        let outcome = acc.process(at(50.0, 30.0, 5.0, 0), SampleOrigin::Device, gate);
        assert_eq!(outcome, SampleOutcome::Rejected(RejectReason::SimulationActive));
        assert!(!outcome.moved_marker());
        assert!(acc.current().is_none());
    }

    #[test]
    fn test_not_accumulating_only_displays() {
        let mut acc = RouteAccumulator::default();
        let paused = FilterGate::default();

        let outcome = acc.process(at(50.0, 30.0, 5.0, 0), SampleOrigin::Device, paused);
        assert_eq!(outcome, SampleOutcome::Displayed);
        assert!(acc.current().is_some());
        assert!(acc.route().is_empty());
        assert!(acc.last_accepted().is_none());
    }

    #[test]
    fn test_reset_keeps_marker() {
        let mut acc = RouteAccumulator::default();
        acc.process(at(50.0, 30.0, 5.0, 0), SampleOrigin::Device, LIVE);
        acc.process(at(50.0001, 30.0, 5.0, 1), SampleOrigin::Device, LIVE);

        acc.reset();
        assert!(acc.route().is_empty());
        assert_eq!(acc.distance_m(), 0.0);
        assert!(acc.last_accepted().is_none());
        assert!(acc.current().is_some());
    }

    fn step_strategy() -> impl Strategy<Value = (f64, f64, f64, bool)> {
        (
            0.0..360.0f64,   // bearing
            0.0..700.0f64,   // step length, spans every gate
            1.0..80.0f64,    // reported accuracy
            any::<bool>(),   // simulated
        )
    }

    proptest! {
        #[test]
        fn prop_distance_and_route_invariants(steps in prop::collection::vec(step_strategy(), 1..60)) {
            let config = FilterConfig::default();
            let mut acc = RouteAccumulator::new(config);
            let mut point = at(50.4501, 30.5234, 5.0, 0);
            let mut expected = 0.0;
            let mut prev_distance = 0.0;
            let mut accepted: Vec<(Position, SampleOrigin)> = Vec::new();

            acc.process(point, SampleOrigin::Device, LIVE);
            accepted.push((point, SampleOrigin::Device));

            for (i, (bearing, len, accuracy, simulated)) in steps.into_iter().enumerate() {
                let origin = if simulated { SampleOrigin::Simulated } else { SampleOrigin::Device };
                point = point.destination(bearing, len);
                point.accuracy = accuracy;
                point.timestamp = i as i64 + 1;

                let before = *acc.last_accepted().unwrap();
                match acc.process(point, origin, LIVE) {
                    SampleOutcome::Accepted { added_m, .. } => {
                        prop_assert!((added_m - before.distance_to(&point)).abs() < 1e-9);
                        expected += added_m;
                        accepted.push((point, origin));
                    }
                    SampleOutcome::JumpTrusted => accepted.push((point, origin)),
                    _ => {
                        prop_assert_eq!(acc.last_accepted(), Some(&before));
                    }
                }

                prop_assert!(acc.distance_m() >= prev_distance);
                prev_distance = acc.distance_m();
            }

            prop_assert!((acc.distance_m() - expected).abs() < 1e-6);

            // Route is an in-order subsequence of accepted positions
            let mut cursor = accepted.iter();
            let mut vertex_origins = Vec::new();
            for vertex in acc.route() {
                let found = cursor.find(|(p, _)| p == vertex);
                prop_assert!(found.is_some());
                if let Some((_, origin)) = found {
                    vertex_origins.push(*origin);
                }
            }

            // Every gap clears the draw threshold of the later vertex's origin
            for (i, pair) in acc.route().windows(2).enumerate() {
                let gap = pair[0].distance_to(&pair[1]);
                prop_assert!(gap >= config.draw_threshold(vertex_origins[i + 1]) - 1e-9);
            }
        }
    }
}
