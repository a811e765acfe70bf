//! Workout session lifecycle on top of a [`PositionTracker`].
//!
//! A workout adds pause/resume and a stopwatch to the tracking session:
//! pausing keeps the subscription alive (the marker still follows the
//! runner) but closes the accumulation gate, and paused time is excluded
//! from the workout duration.

use crate::error::{TrackerError, TrackerResult};
use crate::metrics::{average_speed_mps, format_pace, workout_calories, AthleteProfile};
use crate::position::Position;
use crate::tracker::PositionTracker;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use stride_env::{PositionSource, TrackerContext};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutState {
    #[default]
    Idle,
    Running,
    Paused,
}

/// A finished workout, shaped like the run-creation payload of the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub name: String,

    /// Milliseconds since the Unix epoch
    pub start_time: i64,
    pub end_time: i64,

    /// Active minutes, pauses excluded
    #[serde(rename = "duration")]
    pub duration_min: f64,

    /// Kilometers
    #[serde(rename = "distance")]
    pub distance_km: f64,

    pub calories: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<f64>,

    /// `None` when nothing was recorded
    pub route: Option<Vec<Position>>,
}

struct ActiveWorkout {
    name: String,
    start_time: i64,

    /// Context time when the current running stretch began
    running_since: Option<Duration>,

    /// Active time of all closed stretches
    banked: Duration,
}

/// Teardown run when a workout finishes, e.g. stopping a simulated source.
pub type FinishHook = Box<dyn Fn() + Send + Sync>;

/// Drives one workout at a time over a shared tracker.
pub struct WorkoutSession<Ctx, Src>
where
    Ctx: TrackerContext,
    Src: PositionSource,
{
    tracker: PositionTracker<Ctx, Src>,
    active: Option<ActiveWorkout>,
    on_finish: Option<FinishHook>,
}

impl<Ctx, Src> WorkoutSession<Ctx, Src>
where
    Ctx: TrackerContext,
    Src: PositionSource,
{
    pub fn new(tracker: PositionTracker<Ctx, Src>) -> Self {
        Self {
            tracker,
            active: None,
            on_finish: None,
        }
    }

    /// Runs `hook` after tracking stops in [`WorkoutSession::finish`].
    ///
    /// Wire the simulated source's `stop` here so a finished workout does not
    /// leave it feeding the next session.
    pub fn with_finish_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    pub fn tracker(&self) -> &PositionTracker<Ctx, Src> {
        &self.tracker
    }

    pub fn state(&self) -> WorkoutState {
        match &self.active {
            None => WorkoutState::Idle,
            Some(w) if w.running_since.is_some() => WorkoutState::Running,
            Some(_) => WorkoutState::Paused,
        }
    }

    /// Idle → Running. Starts a fresh tracking session.
    pub fn start(&mut self, name: impl Into<String>) -> TrackerResult<()> {
        if self.active.is_some() {
            return Err(TrackerError::invalid_state("workout already in progress"));
        }

        self.tracker.start_tracking()?;
        self.tracker.set_live(true);

        let context = self.tracker.context();
        let name = name.into();
        info!(%name, "workout started");
        self.active = Some(ActiveWorkout {
            name,
            start_time: context.timestamp_ms(),
            running_since: Some(context.now()),
            banked: Duration::ZERO,
        });
        Ok(())
    }

    /// Running → Paused.
    pub fn pause(&mut self) -> TrackerResult<()> {
        let now = self.tracker.context().now();
        let workout = match self.active.as_mut() {
            Some(w) if w.running_since.is_some() => w,
            _ => return Err(TrackerError::invalid_state("pause requires a running workout")),
        };

        if let Some(since) = workout.running_since.take() {
            workout.banked += now.saturating_sub(since);
        }
        self.tracker.set_live(false);
        debug!(active = ?workout.banked, "workout paused");
        Ok(())
    }

    /// Paused → Running.
    pub fn resume(&mut self) -> TrackerResult<()> {
        let now = self.tracker.context().now();
        let workout = match self.active.as_mut() {
            Some(w) if w.running_since.is_none() => w,
            _ => return Err(TrackerError::invalid_state("resume requires a paused workout")),
        };

        workout.running_since = Some(now);
        self.tracker.set_live(true);
        debug!("workout resumed");
        Ok(())
    }

    /// Running | Paused → Idle. Stops tracking, runs the finish hook and
    /// returns the record.
    ///
    /// Missing profile data and heart rate fall back to the workout defaults
    /// for the calorie estimate.
    pub fn finish(&mut self, profile: &AthleteProfile, avg_hr: Option<f64>) -> TrackerResult<WorkoutRecord> {
        let elapsed = self.elapsed();
        let workout = self
            .active
            .take()
            .ok_or_else(|| TrackerError::invalid_state("no workout to finish"))?;

        self.tracker.stop_tracking();
        if let Some(hook) = &self.on_finish {
            hook();
        }
        self.tracker.set_live(true);

        let snapshot = self.tracker.snapshot();
        let duration_min = elapsed.as_secs_f64() / 60.0;
        let record = WorkoutRecord {
            name: workout.name,
            start_time: workout.start_time,
            end_time: self.tracker.context().timestamp_ms(),
            duration_min,
            distance_km: snapshot.distance_m / 1000.0,
            calories: workout_calories(profile, duration_min, avg_hr),
            avg_heart_rate: avg_hr,
            route: (!snapshot.route.is_empty()).then_some(snapshot.route),
        };

        info!(
            name = %record.name,
            distance_km = record.distance_km,
            duration_min = record.duration_min,
            "workout finished"
        );
        Ok(record)
    }

    /// Active time, paused intervals excluded. Zero when idle.
    pub fn elapsed(&self) -> Duration {
        let Some(workout) = &self.active else {
            return Duration::ZERO;
        };

        let running = workout
            .running_since
            .map(|since| self.tracker.context().now().saturating_sub(since))
            .unwrap_or_default();
        workout.banked + running
    }

    /// Calories burned so far at the default heart rate. Zero when idle.
    pub fn current_calories(&self, profile: &AthleteProfile) -> u32 {
        workout_calories(profile, self.elapsed().as_secs_f64() / 60.0, None)
    }

    /// Pace from the live ground speed, falling back to the session average.
    pub fn current_pace(&self) -> String {
        let speed = self
            .tracker
            .current_position()
            .and_then(|p| p.speed)
            .or_else(|| average_speed_mps(self.tracker.distance_m(), self.elapsed().as_secs_f64()));
        format_pace(speed)
    }
}
