//! Tracking Session Controller - wires position sources into the filter.
//!
//! This module is the integration layer between the pure filtering logic
//! ([`crate::filter`]) and the environment abstraction (`stride_env`).
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     PositionTracker                        │
//! │                                                            │
//! │  DeviceSource ──sink(gen)──┐                               │
//! │                            ├──► normalize ──► RouteAccumulator
//! │  GeoSimulator ──sim sink───┘                      │        │
//! │                                                   ▼        │
//! │                                  watch::Sender<TrackerSnapshot>
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every event is processed to completion under the state lock, in arrival
//! order. Device sinks carry the generation of the subscription that created
//! them, so a late delivery from a cleared watch is a no-op.
//!
//! # Usage
//!
//! ```ignore
//! use stride_core::{PositionTracker, TrackerConfig};
//! use stride_env::{DeviceSource, SystemContext};
//!
//! let (source, feed) = DeviceSource::new();
//! let tracker = PositionTracker::new(SystemContext::shared(), Arc::new(source), TrackerConfig::default());
//!
//! tracker.start_tracking()?;
//! feed.push_fix(payload);
//! println!("{:.1} m", tracker.distance_m());
//! tracker.stop_tracking();
//! ```

use crate::error::{TrackerError, TrackerResult};
use crate::filter::{FilterConfig, FilterGate, RouteAccumulator, SampleOutcome};
use crate::normalize::normalize;
use crate::position::Position;

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use stride_env::{
    PositionSource, RawSample, SampleOrigin, SampleSink, SourceError, SourceEvent, TrackerContext,
    WatchId, WatchOptions,
};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Configuration for a position tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Filter thresholds
    pub filter: FilterConfig,

    /// Options for the continuous subscription
    pub watch: WatchOptions,

    /// Options for one-shot position requests
    pub one_shot: WatchOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            watch: WatchOptions::continuous(),
            one_shot: WatchOptions::one_shot(),
        }
    }
}

/// Read-only view of tracker state for UI layers and the workout store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerSnapshot {
    pub current_position: Option<Position>,
    pub route: Vec<Position>,
    pub distance_m: f64,
    pub is_tracking: bool,
    pub is_simulating: bool,
    pub last_error: Option<String>,
}

/// Compact diagnostic view: status plus the tail of the route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDebug {
    pub is_tracking: bool,
    pub total_points: usize,
    pub current_position: Option<Position>,

    /// `(index in route, vertex)` for the last few vertices
    pub recent: Vec<(usize, Position)>,
}

struct TrackerState {
    accumulator: RouteAccumulator,
    watch: Option<WatchId>,
    active_generation: Option<u64>,
    next_generation: u64,
    is_tracking: bool,
    is_simulating: bool,
    is_live: bool,
    last_error: Option<String>,
}

impl TrackerState {
    fn gate(&self) -> FilterGate {
        FilterGate {
            simulation_active: self.is_simulating,
            accumulating: self.is_tracking && self.is_live,
        }
    }

    fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            current_position: self.accumulator.current().copied(),
            route: self.accumulator.route().to_vec(),
            distance_m: self.accumulator.distance_m(),
            is_tracking: self.is_tracking,
            is_simulating: self.is_simulating,
            last_error: self.last_error.clone(),
        }
    }

    fn ingest(&mut self, sample: &RawSample, now_ms: i64) -> Option<SampleOutcome> {
        let Some(position) = normalize(&sample.payload, now_ms) else {
            trace!(origin = %sample.origin, "unrecognized payload dropped");
            return None;
        };

        let outcome = self.accumulator.process(position, sample.origin, self.gate());
        trace!(origin = %sample.origin, ?outcome, "sample processed");
        Some(outcome)
    }

    fn record_error(&mut self, error: &SourceError) {
        warn!(%error, "position source reported an error");
        self.last_error = Some(error.to_string());
    }
}

/// State shared between the tracker handle and its sinks.
struct Shared {
    state: Mutex<TrackerState>,

    /// Serializes start/stop so a watch is never registered twice
    lifecycle: Mutex<()>,

    updates: watch::Sender<TrackerSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &TrackerState) {
        self.updates.send_replace(state.snapshot());
    }

    fn on_device_event(&self, generation: u64, event: SourceEvent, now_ms: i64) {
        let mut state = self.lock();
        if state.active_generation != Some(generation) {
            trace!(generation, "delivery from cleared watch dropped");
            return;
        }

        match event {
            SourceEvent::Sample(sample) => {
                if state.ingest(&sample, now_ms).is_some_and(|o| o.moved_marker()) {
                    self.publish(&state);
                }
            }
            SourceEvent::Error(error) => {
                state.record_error(&error);
                self.publish(&state);
            }
            SourceEvent::SimulationEnded => {}
        }
    }

    fn on_simulated_event(&self, event: SourceEvent, now_ms: i64) {
        let mut state = self.lock();

        match event {
            SourceEvent::Sample(mut sample) => {
                sample.origin = SampleOrigin::Simulated;
                if !state.is_simulating {
                    debug!("simulated source took precedence over device");
                    state.is_simulating = true;
                }
                state.ingest(&sample, now_ms);
                self.publish(&state);
            }
            SourceEvent::Error(error) => {
                state.record_error(&error);
                self.publish(&state);
            }
            SourceEvent::SimulationEnded => {
                if state.is_simulating {
                    debug!("simulation ended, device samples accepted again");
                    state.is_simulating = false;
                    self.publish(&state);
                }
            }
        }
    }

    fn on_one_shot(&self, event: SourceEvent, now_ms: i64) {
        let mut state = self.lock();

        match event {
            SourceEvent::Sample(sample) => {
                if state.is_simulating {
                    return;
                }
                if let Some(position) = normalize(&sample.payload, now_ms) {
                    state.accumulator.set_current(position);
                    self.publish(&state);
                }
            }
            SourceEvent::Error(error) => {
                state.record_error(&error);
                self.publish(&state);
            }
            SourceEvent::SimulationEnded => {}
        }
    }
}

fn source_failure(error: SourceError) -> TrackerError {
    match error {
        SourceError::Unsupported => TrackerError::Unsupported,
        other => TrackerError::Source(other),
    }
}

/// Owns the start/stop lifecycle of one device's position tracking.
///
/// Generic over the context and source implementations, so the same tracker
/// runs against real hardware or inside the simulation harness. Cloning
/// yields another handle to the same session.
pub struct PositionTracker<Ctx, Src>
where
    Ctx: TrackerContext,
    Src: PositionSource,
{
    context: Arc<Ctx>,
    source: Arc<Src>,
    config: TrackerConfig,
    shared: Arc<Shared>,
}

impl<Ctx, Src> Clone for PositionTracker<Ctx, Src>
where
    Ctx: TrackerContext,
    Src: PositionSource,
{
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            source: Arc::clone(&self.source),
            config: self.config,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Ctx, Src> PositionTracker<Ctx, Src>
where
    Ctx: TrackerContext,
    Src: PositionSource,
{
    /// Creates an idle tracker.
    pub fn new(context: Arc<Ctx>, source: Arc<Src>, config: TrackerConfig) -> Self {
        let state = TrackerState {
            accumulator: RouteAccumulator::new(config.filter),
            watch: None,
            active_generation: None,
            next_generation: 0,
            is_tracking: false,
            is_simulating: false,
            is_live: true,
            last_error: None,
        };
        let (updates, _) = watch::channel(state.snapshot());

        Self {
            context,
            source,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                lifecycle: Mutex::new(()),
                updates,
            }),
        }
    }

    /// Starts a new session: clears route and distance and subscribes to the
    /// device source. No-op while already tracking.
    ///
    /// # Errors
    /// * `TrackerError::Unsupported` - no positioning capability; the error
    ///   is also exposed through [`PositionTracker::last_error`]
    pub fn start_tracking(&self) -> TrackerResult<()> {
        let _lifecycle = self.shared.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        let generation = {
            let mut state = self.shared.lock();
            if state.is_tracking {
                debug!("start_tracking ignored: already tracking");
                return Ok(());
            }

            if !self.source.is_available() {
                state.last_error = Some(TrackerError::Unsupported.to_string());
                self.shared.publish(&state);
                return Err(TrackerError::Unsupported);
            }

            state.accumulator.reset();
            state.is_simulating = false;
            state.last_error = None;
            state.is_tracking = true;
            state.is_live = true;
            state.next_generation += 1;
            let generation = state.next_generation;
            state.active_generation = Some(generation);
            self.shared.publish(&state);
            generation
        };

        match self.source.subscribe(self.device_sink(generation), self.config.watch) {
            Ok(id) => {
                self.shared.lock().watch = Some(id);
                debug!(%id, "tracking started");
                Ok(())
            }
            Err(error) => {
                let mut state = self.shared.lock();
                state.is_tracking = false;
                state.active_generation = None;
                let failure = source_failure(error);
                state.last_error = Some(failure.to_string());
                self.shared.publish(&state);
                Err(failure)
            }
        }
    }

    /// Ends the session and tears down the device subscription.
    ///
    /// Once this returns, no source can change route or distance until the
    /// next [`PositionTracker::start_tracking`]. Idempotent.
    pub fn stop_tracking(&self) {
        let _lifecycle = self.shared.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        let watch = {
            let mut state = self.shared.lock();
            if !state.is_tracking {
                return;
            }
            state.is_tracking = false;
            state.is_simulating = false;
            state.active_generation = None;
            let watch = state.watch.take();
            self.shared.publish(&state);
            watch
        };

        if let Some(id) = watch {
            self.source.unsubscribe(id);
        }
        debug!("tracking stopped");
    }

    /// Requests a single fix to refresh the live position.
    ///
    /// Never touches route or distance.
    pub fn get_current_position(&self) -> TrackerResult<()> {
        if !self.source.is_available() {
            return Err(TrackerError::Unsupported);
        }
        self.source
            .request_once(self.one_shot_sink(), self.config.one_shot)
            .map_err(source_failure)
    }

    /// Gates accumulation without ending the session (pause/resume).
    pub fn set_live(&self, live: bool) {
        let mut state = self.shared.lock();
        if state.is_live != live {
            state.is_live = live;
            debug!(live, "accumulation gate changed");
            self.shared.publish(&state);
        }
    }

    /// Sink to hand to a simulated source.
    ///
    /// Everything pushed here is treated as simulated and takes precedence
    /// over device samples until [`SourceEvent::SimulationEnded`] arrives or
    /// tracking stops.
    pub fn simulation_sink(&self) -> SampleSink {
        let shared = Arc::downgrade(&self.shared);
        let context = Arc::clone(&self.context);
        Arc::new(move |event| {
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.on_simulated_event(event, context.timestamp_ms());
            }
        })
    }

    fn device_sink(&self, generation: u64) -> SampleSink {
        let shared = Arc::downgrade(&self.shared);
        let context = Arc::clone(&self.context);
        Arc::new(move |event| {
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.on_device_event(generation, event, context.timestamp_ms());
            }
        })
    }

    fn one_shot_sink(&self) -> SampleSink {
        let shared = Arc::downgrade(&self.shared);
        let context = Arc::clone(&self.context);
        Arc::new(move |event| {
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.on_one_shot(event, context.timestamp_ms());
            }
        })
    }

    /// Observes state changes (one snapshot per change).
    pub fn subscribe_updates(&self) -> watch::Receiver<TrackerSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Copies the full current state.
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.shared.lock().snapshot()
    }

    /// Status plus the last `tail` route vertices.
    pub fn route_debug(&self, tail: usize) -> RouteDebug {
        let state = self.shared.lock();
        let route = state.accumulator.route();
        let skip = route.len().saturating_sub(tail);

        RouteDebug {
            is_tracking: state.is_tracking,
            total_points: route.len(),
            current_position: state.accumulator.current().copied(),
            recent: route.iter().copied().enumerate().skip(skip).collect(),
        }
    }

    pub fn current_position(&self) -> Option<Position> {
        self.shared.lock().accumulator.current().copied()
    }

    pub fn route(&self) -> Vec<Position> {
        self.shared.lock().accumulator.route().to_vec()
    }

    pub fn distance_m(&self) -> f64 {
        self.shared.lock().accumulator.distance_m()
    }

    pub fn is_tracking(&self) -> bool {
        self.shared.lock().is_tracking
    }

    pub fn is_simulating(&self) -> bool {
        self.shared.lock().is_simulating
    }

    pub fn is_live(&self) -> bool {
        self.shared.lock().is_live
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    /// The environment context this tracker stamps samples with.
    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
