//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::error::{SimError, SimResult};
use crate::simulator::{GeoSimulator, SimulatorConfig};
use crate::trace::{DeviceTrace, TraceConfig, TraceFix};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stride_core::{PositionTracker, TrackerConfig};
use stride_env::{DeviceFeed, DeviceSource, GeolocationPayload, TrackerContext};
use tracing::{debug, warn};

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Simulated run length in seconds
    pub duration_secs: f64,

    /// Allowed relative error of measured vs true distance
    pub distance_tolerance: f64,

    pub tracker: TrackerConfig,
    pub simulator: SimulatorConfig,
    pub trace: TraceConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration_secs: 600.0,
            distance_tolerance: 0.15,
            tracker: TrackerConfig::default(),
            simulator: SimulatorConfig::default(),
            trace: TraceConfig::default(),
        }
    }
}

impl SimConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(self.duration_secs > 0.0) {
            return Err(SimError::config("duration_secs must be positive"));
        }
        if self.simulator.update_interval_ms == 0 || self.trace.interval_ms == 0 {
            return Err(SimError::config("update intervals must be positive"));
        }
        if !(self.distance_tolerance > 0.0) {
            return Err(SimError::config("distance_tolerance must be positive"));
        }
        Ok(())
    }
}

/// The SimWorld - one tracker wired to a scripted device and a simulator,
/// all on the same virtual clock.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Tracker under test
    pub tracker: PositionTracker<SimContext, DeviceSource>,

    /// Platform side of the device source
    pub feed: DeviceFeed,

    /// Simulated source, emitting into the tracker's simulation sink
    pub simulator: GeoSimulator<SimContext>,

    /// Ground truth runner behind the device fixes
    pub trace: DeviceTrace,

    samples: u64,
    last_distance_m: f64,
    violations: Vec<String>,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Self {
        Self::with_trace(config.clone(), config.trace)
    }

    /// Same as [`SimWorld::new`] but with a custom device trace layout.
    pub fn with_trace(config: SimConfig, trace: TraceConfig) -> Self {
        // Derive separate streams so changing one source leaves the other intact
        let context = SimContext::shared(config.seed);
        let trace = DeviceTrace::with_rng(trace, context.derive_rng(1));
        let simulator_config = config
            .simulator
            .with_seed(config.seed.wrapping_mul(0x9e3779b97f4a7c15));

        let (source, feed) = DeviceSource::new();
        let tracker = PositionTracker::new(Arc::clone(&context), Arc::new(source), config.tracker);
        let simulator = GeoSimulator::new(Arc::clone(&context), simulator_config, tracker.simulation_sink());

        Self {
            config,
            context,
            tracker,
            feed,
            simulator,
            trace,
            samples: 0,
            last_distance_m: 0.0,
            violations: Vec::new(),
        }
    }

    /// Advances the virtual clock.
    pub fn advance(&self, by: Duration) {
        self.context.advance_time(by);
    }

    /// Moves the runner one trace interval and delivers the device fix
    /// stamped with the current virtual time.
    pub fn device_fix(&mut self) -> TraceFix {
        self.trace.step();
        let fix = self.trace.fix(self.context.timestamp_ms());
        self.feed.push_fix(fix.payload.to_value());
        self.samples += 1;
        self.observe();
        fix
    }

    /// One simulator step, if the simulator is active.
    pub fn sim_tick(&mut self) -> Option<GeolocationPayload> {
        let payload = self.simulator.tick()?;
        self.samples += 1;
        self.observe();
        Some(payload)
    }

    fn observe(&mut self) {
        let distance = self.tracker.distance_m();
        if distance < self.last_distance_m {
            let msg = format!(
                "distance decreased from {:.2} m to {:.2} m at sample {}",
                self.last_distance_m, distance, self.samples
            );
            warn!("{}", msg);
            self.violations.push(msg);
        }
        self.last_distance_m = distance;

        if self.samples % 60 == 0 {
            debug!(
                "  t={:.0}s | samples={} | distance={:.1}m | route={}",
                self.context.now().as_secs_f64(),
                self.samples,
                distance,
                self.tracker.route().len()
            );
        }
    }

    /// Records an invariant violation found by a scenario.
    pub fn violation(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{}", msg);
        self.violations.push(msg);
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Samples delivered so far from either source.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn time_secs(&self) -> f64 {
        self.context.now().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_creation() {
        let world = SimWorld::new(SimConfig::default());
        assert_eq!(world.samples(), 0);
        assert!(!world.tracker.is_tracking());
        assert!(!world.simulator.is_active());
    }

    #[test]
    fn test_device_fix_reaches_tracker() {
        let mut world = SimWorld::new(SimConfig::default());
        world.tracker.start_tracking().unwrap();

        world.advance(Duration::from_secs(2));
        let fix = world.device_fix();

        let current = world.tracker.current_position().unwrap();
        assert_eq!(current.timestamp, world.context.timestamp_ms());
        assert_eq!(fix.payload.timestamp, current.timestamp);
        assert_eq!(world.samples(), 1);
    }

    #[test]
    fn test_sim_tick_needs_active_simulator() {
        let mut world = SimWorld::new(SimConfig::default());
        assert!(world.sim_tick().is_none());

        world.simulator.start_manual();
        assert!(world.sim_tick().is_some());
        assert!(world.tracker.is_simulating());
    }

    #[test]
    fn test_config_validation() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(SimConfig::default().with_duration(0.0).validate().is_err());

        let mut config = SimConfig::default();
        config.simulator.update_interval_ms = 0;
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn test_config_partial_json() {
        let config: SimConfig = serde_json::from_str(r#"{ "seed": 7, "trace": { "speed_mps": 4.0 } }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.trace.speed_mps, 4.0);
        assert_eq!(config.trace.interval_ms, 2000);
        assert_eq!(config.duration_secs, 600.0);
    }
}
