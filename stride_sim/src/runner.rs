//! Scenario runner - drives the tracker through scripted runs.

use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use serde::Serialize;
use std::time::Duration;
use stride_core::metrics::{format_distance, format_duration};
use stride_core::position::{haversine_m, path_length_m};
use stride_core::{AthleteProfile, Position, WorkoutSession};
use stride_env::GeolocationPayload;
use tracing::{debug, info};

/// Relative tolerance for runs where distance is exact up to float error.
const EXACT_TOLERANCE: f64 = 1e-6;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Distance the tracker accumulated
    pub distance_m: f64,

    /// Distance the runner really covered
    pub expected_m: f64,

    /// Stored route vertices
    pub route_points: usize,

    /// Samples delivered from either source
    pub samples: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Route at the end of the run
    #[serde(skip)]
    pub route: Vec<Position>,
}

/// Runs tracking scenarios.
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner with default settings.
    pub fn new(seed: u64) -> Self {
        Self::from_config(SimConfig::default().with_seed(seed))
    }

    pub fn from_config(config: SimConfig) -> Self {
        Self { config }
    }

    /// Sets the run length.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.config.duration_secs = secs;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let result = match scenario {
            ScenarioId::Loop => self.run_loop(),
            ScenarioId::NoisyDevice => self.run_noisy_device(),
            ScenarioId::Handover => self.run_handover(),
            ScenarioId::PauseResume => self.run_pause_resume(),
        };

        info!(
            "  {} measured vs {} true over {} ({} samples, {} route points)",
            format_distance(result.distance_m / 1000.0),
            format_distance(result.expected_m / 1000.0),
            format_duration(result.final_time_secs as u64),
            result.samples,
            result.route_points
        );
        result
    }

    fn steps(&self, interval_ms: u64) -> u64 {
        (self.config.duration_secs * 1000.0 / interval_ms as f64).floor() as u64
    }

    /// Simulator only. Distance must equal the emitted path, and nothing may
    /// change once tracking stops even though the simulator keeps running.
    fn run_loop(&self) -> ScenarioResult {
        let mut world = SimWorld::new(self.config.clone());
        let interval = Duration::from_millis(self.config.simulator.update_interval_ms);

        if let Err(e) = world.tracker.start_tracking() {
            return self.aborted(ScenarioId::Loop, &world, e.to_string());
        }
        world.simulator.start_manual();

        let mut emitted: Vec<GeolocationPayload> = Vec::new();
        for _ in 0..self.steps(self.config.simulator.update_interval_ms) {
            world.advance(interval);
            emitted.extend(world.sim_tick());
        }
        let expected = payload_path_m(&emitted);

        world.tracker.stop_tracking();
        let frozen_route = world.tracker.route();
        let frozen_distance = world.tracker.distance_m();

        for _ in 0..5 {
            world.advance(interval);
            world.sim_tick();
        }
        if world.tracker.route() != frozen_route || world.tracker.distance_m() != frozen_distance {
            world.violation("route or distance changed after stop_tracking");
        }
        if !world.simulator.is_active() {
            world.violation("stopping the tracker stopped the simulator");
        }

        world.simulator.stop();
        if world.sim_tick().is_some() {
            world.violation("simulator emitted after stop");
        }

        self.finish(ScenarioId::Loop, world, frozen_distance, expected, EXACT_TOLERANCE)
    }

    /// Device only, with noise, poor-accuracy fixes and outliers.
    fn run_noisy_device(&self) -> ScenarioResult {
        let mut world = SimWorld::new(self.config.clone());
        let interval = Duration::from_millis(self.config.trace.interval_ms);

        if let Err(e) = world.tracker.start_tracking() {
            return self.aborted(ScenarioId::NoisyDevice, &world, e.to_string());
        }

        let mut start_truth = None;
        for _ in 0..self.steps(self.config.trace.interval_ms) {
            world.advance(interval);
            world.device_fix();
            start_truth.get_or_insert(world.trace.truth_distance_m());
        }
        world.tracker.stop_tracking();

        let expected = world.trace.truth_distance_m() - start_truth.unwrap_or_default();
        let distance = world.tracker.distance_m();
        self.finish(ScenarioId::NoisyDevice, world, distance, expected, self.config.distance_tolerance)
    }

    /// First half on the device, second half simulated while the device
    /// keeps reporting. Device fixes must not move the marker once the
    /// simulator is authoritative.
    fn run_handover(&self) -> ScenarioResult {
        let half_secs = self.config.duration_secs / 2.0;
        let trace = &self.config.trace;

        // Run north into the simulator's starting point
        let (sim_lat, sim_lng) = self.config.simulator.point_at(0.0);
        let approach_m = trace.speed_mps * half_secs;
        let start = Position::new(sim_lat, sim_lng, 0.0, 0).destination(180.0, approach_m);
        let trace = trace.with_origin(start.latitude, start.longitude).with_heading(0.0);

        let mut world = SimWorld::with_trace(self.config.clone(), trace);
        if let Err(e) = world.tracker.start_tracking() {
            return self.aborted(ScenarioId::Handover, &world, e.to_string());
        }

        let device_interval = Duration::from_millis(trace.interval_ms);
        let device_steps = (half_secs * 1000.0 / trace.interval_ms as f64).floor() as u64;
        let mut start_truth = None;
        for _ in 0..device_steps {
            world.advance(device_interval);
            world.device_fix();
            start_truth.get_or_insert(world.trace.truth_distance_m());
        }
        let device_truth = world.trace.truth_distance_m() - start_truth.unwrap_or_default();
        let last_device_truth = world.trace.truth();
        debug!("  handover at t={:.0}s after {:.1}m on device", world.time_secs(), device_truth);

        world.simulator.start_manual();
        let sim_interval_ms = self.config.simulator.update_interval_ms;
        let sim_interval = Duration::from_millis(sim_interval_ms);
        let mut emitted: Vec<GeolocationPayload> = Vec::new();
        let mut since_device_ms = 0;

        for _ in 0..(half_secs * 1000.0 / sim_interval_ms as f64).floor() as u64 {
            world.advance(sim_interval);
            let Some(payload) = world.sim_tick() else {
                world.violation("simulator stopped emitting during handover");
                break;
            };
            emitted.push(payload);

            since_device_ms += sim_interval_ms;
            if since_device_ms >= trace.interval_ms {
                since_device_ms = 0;
                world.device_fix();

                let current = world.tracker.current_position();
                if current.map(|p| (p.latitude, p.longitude))
                    != Some((payload.coords.latitude, payload.coords.longitude))
                {
                    world.violation(format!("device fix moved the marker at t={:.0}s", world.time_secs()));
                }
            }
        }

        let handover_gap = emitted
            .first()
            .map(|p| haversine_m(last_device_truth.latitude, last_device_truth.longitude, p.coords.latitude, p.coords.longitude))
            .unwrap_or_default();
        let expected = device_truth + handover_gap + payload_path_m(&emitted);

        world.simulator.stop();
        if world.tracker.is_simulating() {
            world.violation("simulation flag still set after simulator stop");
        }
        world.tracker.stop_tracking();

        let distance = world.tracker.distance_m();
        self.finish(ScenarioId::Handover, world, distance, expected, self.config.distance_tolerance)
    }

    /// Device run inside a workout: a third running, a third paused while
    /// the runner stands still, a third running again.
    fn run_pause_resume(&self) -> ScenarioResult {
        let mut world = SimWorld::new(self.config.clone());
        let mut session = WorkoutSession::new(world.tracker.clone());
        let interval_ms = self.config.trace.interval_ms;
        let interval = Duration::from_millis(interval_ms);

        if let Err(e) = session.start(format!("Simulated run {}", self.config.seed)) {
            return self.aborted(ScenarioId::PauseResume, &world, e.to_string());
        }

        let third = self.steps(interval_ms) / 3;
        let run_speed = world.trace.config().speed_mps;
        let mut start_truth = None;

        for phase in 0..3 {
            let paused = phase == 1;
            if paused {
                if let Err(e) = session.pause() {
                    world.violation(e.to_string());
                }
                world.trace.set_speed(0.0);
            } else if phase == 2 {
                if let Err(e) = session.resume() {
                    world.violation(e.to_string());
                }
                world.trace.set_speed(run_speed);
            }

            let before = world.tracker.distance_m();
            for _ in 0..third {
                world.advance(interval);
                world.device_fix();
                start_truth.get_or_insert(world.trace.truth_distance_m());
            }
            if paused && world.tracker.distance_m() != before {
                world.violation("distance grew while paused");
            }
        }

        let expected = world.trace.truth_distance_m() - start_truth.unwrap_or_default();
        let expected_active = Duration::from_millis(2 * third * interval_ms);

        match session.finish(&AthleteProfile::default(), None) {
            Ok(record) => {
                let active_secs = record.duration_min * 60.0;
                if (active_secs - expected_active.as_secs_f64()).abs() > 1e-3 {
                    world.violation(format!(
                        "workout lasted {:.1}s, expected {:?} of active time",
                        active_secs, expected_active
                    ));
                }
            }
            Err(e) => world.violation(e.to_string()),
        }

        let distance = world.tracker.distance_m();
        self.finish(ScenarioId::PauseResume, world, distance, expected, self.config.distance_tolerance)
    }

    /// Checks the end state and builds the result.
    fn finish(
        &self,
        scenario: ScenarioId,
        mut world: SimWorld,
        distance_m: f64,
        expected_m: f64,
        tolerance: f64,
    ) -> ScenarioResult {
        let route = world.tracker.route();
        let filter = &self.config.tracker.filter;
        let min_spacing = filter.device_draw_threshold_m.min(filter.simulated_draw_threshold_m);

        if route.is_empty() {
            world.violation("no route recorded");
        }
        if let Some(i) = route.windows(2).position(|w| w[0].distance_to(&w[1]) < min_spacing) {
            world.violation(format!("route vertices {} and {} closer than {:.1} m", i, i + 1, min_spacing));
        }
        if path_length_m(&route) > distance_m + 1e-6 {
            world.violation("route path longer than accumulated distance");
        }

        let error = (distance_m - expected_m).abs();
        if error > expected_m * tolerance + 1e-6 {
            world.violation(format!(
                "distance {:.1}m off ground truth {:.1}m by {:.1}%",
                distance_m,
                expected_m,
                100.0 * error / expected_m.max(f64::EPSILON)
            ));
        }

        let failure_reason = (!world.violations().is_empty()).then(|| world.violations().join("; "));
        ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: failure_reason.is_none(),
            distance_m,
            expected_m,
            route_points: route.len(),
            samples: world.samples(),
            final_time_secs: world.time_secs(),
            failure_reason,
            route,
        }
    }

    fn aborted(&self, scenario: ScenarioId, world: &SimWorld, reason: String) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: false,
            distance_m: 0.0,
            expected_m: 0.0,
            route_points: 0,
            samples: world.samples(),
            final_time_secs: world.time_secs(),
            failure_reason: Some(reason),
            route: Vec::new(),
        }
    }
}

/// Great-circle length of the path through emitted payloads.
fn payload_path_m(payloads: &[GeolocationPayload]) -> f64 {
    payloads
        .windows(2)
        .map(|w| haversine_m(w[0].coords.latitude, w[0].coords.longitude, w[1].coords.latitude, w[1].coords.longitude))
        .sum()
}
