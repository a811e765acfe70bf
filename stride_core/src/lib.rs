//! Stride Core - live GPS run tracking
//!
//! Turns a noisy stream of position samples into a trustworthy running
//! route and distance:
//! 1. **Normalization**: raw payloads of either known shape become a [`Position`]
//! 2. **Filtering**: accuracy, jump and jitter gates plus route decimation
//! 3. **Session control**: start/stop, source precedence and pause/resume
//!
//! Sources and clocks are abstracted by `stride_env`, so the same tracker
//! runs against a device or inside the `stride_sim` harness.

pub mod error;
pub mod filter;
pub mod metrics;
pub mod normalize;
pub mod position;
pub mod tracker;
pub mod workout;

// Re-export key types for convenience
pub use error::{TrackerError, TrackerResult};
pub use filter::{FilterConfig, FilterGate, RejectReason, RouteAccumulator, SampleOutcome};
pub use metrics::{workout_calories, AthleteProfile, Gender};
pub use normalize::normalize;
pub use position::{haversine_m, Position};
pub use tracker::{PositionTracker, RouteDebug, TrackerConfig, TrackerSnapshot};
pub use workout::{FinishHook, WorkoutRecord, WorkoutSession, WorkoutState};
