//! Simulated position source: a runner circling an ellipse.
//!
//! The simulator knows nothing about the tracker. It only pushes
//! [`SourceEvent`]s into the sink it was built with, so a tracker wires it in
//! through `PositionTracker::simulation_sink`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use stride_env::{Coords, GeolocationPayload, RawSample, SampleSink, SourceEvent, TrackerContext};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Meters per degree of latitude, as the ellipse step assumes.
const METERS_PER_DEGREE: f64 = 111_000.0;

/// Configuration for the simulated route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub origin_lat: f64,
    pub origin_lng: f64,

    /// Latitude semi-axis in degrees; the longitude semi-axis is 1.5x this
    pub radius_deg: f64,

    pub base_speed_kmh: f64,

    /// Per-tick speed fluctuation is uniform in `[-jitter, +jitter)`
    pub speed_jitter_kmh: f64,

    pub update_interval_ms: u64,

    /// Fixed RNG seed; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            origin_lat: 50.4501,
            origin_lng: 30.5234,
            radius_deg: 0.0025,
            base_speed_kmh: 10.0,
            speed_jitter_kmh: 0.8,
            update_interval_ms: 1000,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn with_origin(mut self, lat: f64, lng: f64) -> Self {
        self.origin_lat = lat;
        self.origin_lng = lng;
        self
    }

    pub fn with_speed(mut self, base_kmh: f64, jitter_kmh: f64) -> Self {
        self.base_speed_kmh = base_kmh;
        self.speed_jitter_kmh = jitter_kmh;
        self
    }

    pub fn with_interval(mut self, interval_ms: u64) -> Self {
        self.update_interval_ms = interval_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Angular step in degrees for one tick at `speed_kmh`.
    pub fn angle_step_deg(&self, speed_kmh: f64) -> f64 {
        (speed_kmh * 1000.0 / 3600.0) / (self.radius_deg * METERS_PER_DEGREE) * (360.0 / (2.0 * PI))
    }

    /// Point on the ellipse at `angle_deg`, as `(lat, lng)`.
    pub fn point_at(&self, angle_deg: f64) -> (f64, f64) {
        let rad = angle_deg.to_radians();
        (
            self.origin_lat + self.radius_deg * rad.cos(),
            self.origin_lng + self.radius_deg * 1.5 * rad.sin(),
        )
    }
}

/// Mutable simulator state. Only held while stepping, never across the sink.
struct Motion {
    active: bool,
    angle_deg: f64,
    ticks: u64,
    rng: ChaCha8Rng,
}

struct SimCore<Ctx: TrackerContext> {
    context: Arc<Ctx>,
    config: SimulatorConfig,
    sink: SampleSink,
    motion: Mutex<Motion>,

    /// Held across every sink call so `stop` can wait out a tick in flight
    emission: Mutex<()>,
}

impl<Ctx: TrackerContext> SimCore<Ctx> {
    fn lock(&self) -> MutexGuard<'_, Motion> {
        self.motion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emission(&self) -> MutexGuard<'_, ()> {
        self.emission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One step and emission. Returns `None` when stopped.
    fn tick(&self) -> Option<GeolocationPayload> {
        let _emitting = self.emission();
        let payload = self.step()?;
        (self.sink)(SourceEvent::Sample(RawSample::simulated(payload.to_value())));
        Some(payload)
    }

    fn step(&self) -> Option<GeolocationPayload> {
        let mut motion = self.lock();
        if !motion.active {
            return None;
        }

        let jitter = self.config.speed_jitter_kmh;
        let fluctuation = if jitter > 0.0 {
            Uniform::new(-jitter, jitter).sample(&mut motion.rng)
        } else {
            0.0
        };
        let speed_kmh = self.config.base_speed_kmh + fluctuation;

        motion.angle_deg += self.config.angle_step_deg(speed_kmh);
        motion.ticks += 1;
        let (latitude, longitude) = self.config.point_at(motion.angle_deg);

        let payload = GeolocationPayload {
            coords: Coords {
                latitude,
                longitude,
                accuracy: Some(5.0),
                altitude: Some(100.0 + motion.rng.gen::<f64>() * 2.0),
                heading: Some(motion.angle_deg),
                speed: Some(speed_kmh / 3.6),
            },
            timestamp: self.context.timestamp_ms(),
        };

        trace!(tick = motion.ticks, latitude, longitude, speed_kmh, "simulated fix");
        Some(payload)
    }
}

/// Simulated position source with a Stopped ⇄ Active state machine.
pub struct GeoSimulator<Ctx: TrackerContext> {
    core: Arc<SimCore<Ctx>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<Ctx: TrackerContext> GeoSimulator<Ctx> {
    /// Creates a stopped simulator that will emit into `sink`.
    ///
    /// The sink may query the simulator (`is_active`, `ticks`) but must not
    /// call `stop` or `tick` on it: both wait for the emission in progress.
    pub fn new(context: Arc<Ctx>, config: SimulatorConfig, sink: SampleSink) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            core: Arc::new(SimCore {
                context,
                config,
                sink,
                motion: Mutex::new(Motion {
                    active: false,
                    angle_deg: 0.0,
                    ticks: 0,
                    rng,
                }),
                emission: Mutex::new(()),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Activates and spawns the tick timer. No-op when already active.
    ///
    /// Must be called from within a tokio runtime. The first fix is emitted
    /// one interval after start.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.activate() {
            return;
        }

        let core: Weak<SimCore<Ctx>> = Arc::downgrade(&self.core);
        let period = Duration::from_millis(self.core.config.update_interval_ms.max(1));
        *timer = Some(self.core.context.spawn("geo-simulator", async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                let Some(core) = core.upgrade() else { break };
                if core.tick().is_none() {
                    break;
                }
            }
        }));
        debug!(interval = ?period, "simulation started");
    }

    /// Activates without a timer; the caller drives [`GeoSimulator::tick`].
    ///
    /// No-op when already active.
    pub fn start_manual(&self) {
        if self.activate() {
            debug!("simulation started (manual ticks)");
        }
    }

    fn activate(&self) -> bool {
        let mut motion = self.core.lock();
        if motion.active {
            return false;
        }
        motion.active = true;
        true
    }

    /// Deactivates, cancels the timer and announces the end of simulation.
    ///
    /// No fix is emitted after this returns. Idempotent.
    pub fn stop(&self) {
        let timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = timer {
            handle.abort();
        }

        // Waits for a tick in flight
        let _emitting = self.core.emission();
        {
            let mut motion = self.core.lock();
            if !motion.active {
                return;
            }
            motion.active = false;
        }

        (self.core.sink)(SourceEvent::SimulationEnded);
        debug!("simulation stopped");
    }

    /// Flips the state and returns whether the simulator is now active.
    pub fn toggle(&self) -> bool {
        if self.is_active() {
            self.stop();
            false
        } else {
            self.start();
            true
        }
    }

    /// Performs one step synchronously. Returns the emitted payload, or
    /// `None` when stopped.
    pub fn tick(&self) -> Option<GeolocationPayload> {
        self.core.tick()
    }

    pub fn is_active(&self) -> bool {
        self.core.lock().active
    }

    /// Ticks emitted since construction.
    pub fn ticks(&self) -> u64 {
        self.core.lock().ticks
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.core.config
    }
}

impl<Ctx: TrackerContext> Drop for GeoSimulator<Ctx> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use approx::assert_relative_eq;
    use std::sync::OnceLock;
    use stride_core::{haversine_m, normalize, AthleteProfile, PositionTracker, TrackerConfig, WorkoutSession};
    use stride_env::DeviceSource;

    fn recording() -> (SampleSink, Arc<Mutex<Vec<SourceEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&events);
        let sink: SampleSink = Arc::new(move |event| captured.lock().unwrap().push(event));
        (sink, events)
    }

    fn simulator(seed: u64) -> (GeoSimulator<SimContext>, Arc<Mutex<Vec<SourceEvent>>>) {
        let (sink, events) = recording();
        let sim = GeoSimulator::new(SimContext::shared(seed), SimulatorConfig::default().with_seed(seed), sink);
        (sim, events)
    }

    #[test]
    fn test_angle_step() {
        let config = SimulatorConfig::default();
        // 10 km/h on a 277.5 m radius: 2.778 m/s over 277.5 m, about 0.01001 rad per second
        let expected = ((10.0 / 3.6) / 277.5f64).to_degrees();
        assert_relative_eq!(config.angle_step_deg(10.0), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_tick_requires_active() {
        let (sim, events) = simulator(1);
        assert!(sim.tick().is_none());
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tick_payload() {
        let (sim, events) = simulator(7);
        sim.start_manual();

        let payload = sim.tick().unwrap();
        let coords = payload.coords;
        assert_eq!(coords.accuracy, Some(5.0));

        let speed_kmh = coords.speed.unwrap() * 3.6;
        assert!((9.2..10.8).contains(&speed_kmh));

        let altitude = coords.altitude.unwrap();
        assert!((100.0..102.0).contains(&altitude));

        let (lat, lng) = sim.config().point_at(coords.heading.unwrap());
        assert_relative_eq!(coords.latitude, lat, epsilon = 1e-12);
        assert_relative_eq!(coords.longitude, lng, epsilon = 1e-12);
        assert_eq!(payload.timestamp, 1_704_067_200_000);

        let events = events.lock().unwrap();
        match &events[0] {
            SourceEvent::Sample(sample) => {
                assert!(sample.origin.is_simulated());
                assert!(normalize(&sample.payload, 0).is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_consecutive_fixes_a_few_meters_apart() {
        let (sim, _events) = simulator(3);
        sim.start_manual();

        let mut prev = sim.tick().unwrap().coords;
        for _ in 0..50 {
            let next = sim.tick().unwrap().coords;
            let d = haversine_m(prev.latitude, prev.longitude, next.latitude, next.longitude);
            assert!(d > 1.0 && d < 5.0, "step of {d} m");
            prev = next;
        }
    }

    #[test]
    fn test_seeded_runs_identical() {
        let (a, _) = simulator(99);
        let (b, _) = simulator(99);
        a.start_manual();
        b.start_manual();

        for _ in 0..10 {
            assert_eq!(a.tick(), b.tick());
        }
    }

    #[test]
    fn test_stop_emits_end_once() {
        let (sim, events) = simulator(5);
        sim.stop();
        assert!(events.lock().unwrap().is_empty());

        sim.start_manual();
        sim.tick();
        sim.stop();
        sim.stop();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], SourceEvent::SimulationEnded);
        assert!(sim.tick().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_emits_every_interval() {
        let (sim, events) = simulator(11);
        sim.start();
        sim.start();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(sim.ticks(), 3);

        sim.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sim.ticks(), 3);

        let samples = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SourceEvent::Sample(_)))
            .count();
        assert_eq!(samples, 3);
    }

    #[test]
    fn test_sink_can_query_simulator() {
        let handle: Arc<OnceLock<Weak<GeoSimulator<SimContext>>>> = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (lookup, captured) = (Arc::clone(&handle), Arc::clone(&seen));
        let sink: SampleSink = Arc::new(move |event| {
            if let (SourceEvent::Sample(_), Some(sim)) = (&event, lookup.get().and_then(Weak::upgrade)) {
                captured.lock().unwrap().push((sim.is_active(), sim.ticks()));
            }
        });

        let sim = Arc::new(GeoSimulator::new(
            SimContext::shared(3),
            SimulatorConfig::default().with_seed(3),
            sink,
        ));
        assert!(handle.set(Arc::downgrade(&sim)).is_ok());

        sim.start_manual();
        sim.tick().unwrap();
        sim.tick().unwrap();
        sim.stop();
        assert_eq!(*seen.lock().unwrap(), vec![(true, 1), (true, 2)]);
    }

    #[test]
    fn test_finished_workout_stops_simulation() {
        let context = SimContext::shared(5);
        let (source, _feed) = DeviceSource::new();
        let tracker = PositionTracker::new(Arc::clone(&context), Arc::new(source), TrackerConfig::default());
        let sim = Arc::new(GeoSimulator::new(
            Arc::clone(&context),
            SimulatorConfig::default().with_seed(5),
            tracker.simulation_sink(),
        ));

        let stopper = Arc::clone(&sim);
        let mut session = WorkoutSession::new(tracker.clone()).with_finish_hook(move || stopper.stop());
        session.start("Loop").unwrap();

        sim.start_manual();
        context.advance_time(Duration::from_secs(1));
        sim.tick().unwrap();
        assert!(tracker.is_simulating());

        session.finish(&AthleteProfile::default(), None).unwrap();
        assert!(!sim.is_active());
        assert!(!tracker.is_simulating());
        assert!(sim.tick().is_none());

        // The next workout records from the device again
        session.start("Next").unwrap();
        assert!(!tracker.is_simulating());
        assert!(sim.tick().is_none());
    }

    proptest::proptest! {
        #[test]
        fn prop_fixes_stay_on_ellipse(seed in proptest::prelude::any::<u64>(), ticks in 1usize..60) {
            let (sim, _events) = simulator(seed);
            sim.start_manual();
            let config = *sim.config();
            let mut last_heading = 0.0;

            for _ in 0..ticks {
                let coords = sim.tick().unwrap().coords;
                let speed_kmh = coords.speed.unwrap() * 3.6;
                proptest::prop_assert!(speed_kmh >= 9.2 - 1e-9 && speed_kmh < 10.8 + 1e-9);

                let heading = coords.heading.unwrap();
                proptest::prop_assert!(heading > last_heading);
                last_heading = heading;

                let dy = (coords.latitude - config.origin_lat) / config.radius_deg;
                let dx = (coords.longitude - config.origin_lng) / (1.5 * config.radius_deg);
                proptest::prop_assert!((dx * dx + dy * dy - 1.0).abs() < 1e-6);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle() {
        let (sim, _events) = simulator(2);
        assert!(sim.toggle());
        assert!(sim.is_active());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!sim.toggle());
        assert!(!sim.is_active());
        assert_eq!(sim.ticks(), 1);
    }
}
