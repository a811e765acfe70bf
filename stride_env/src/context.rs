//! Core environment context trait for stride trackers.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// The central interface for clock and task access.
///
/// This trait abstracts the "real world" so that the tracking core can run
/// both in production (system clock, tokio tasks) and in simulation
/// (virtual clock advanced by the test harness).
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps `SystemTime::now`, `tokio::spawn`
/// - **Simulation**: `SimContext` (in `stride_sim`) - manually advanced clock
pub trait TrackerContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used to stamp samples.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Milliseconds since the Unix epoch, as carried by position samples.
    fn timestamp_ms(&self) -> i64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    /// Spawns a background task and returns its handle.
    ///
    /// Must be called from within a tokio runtime.
    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;
}
