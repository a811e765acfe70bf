//! Position source abstraction.

use crate::error::SourceError;
use crate::types::{SampleSink, WatchId, WatchOptions};

/// Abstraction over anything that can report the device position.
///
/// # Implementations
///
/// - **Production**: [`crate::DeviceSource`], fed by platform glue
/// - **Simulation**: `GeoSimulator` in `stride_sim` pushes into a sink
///   directly and does not need this trait
///
/// # Event Flow
///
/// ```text
/// Platform                Source                     Tracker
///   |                       |                           |
///   |-- fix --------------->|                           |
///   |                       |-- sink(Sample) ---------->|
///   |-- permission lost --->|                           |
///   |                       |-- sink(Error) ----------->|
/// ```
pub trait PositionSource: Send + Sync + 'static {
    /// Returns false when the platform has no positioning capability.
    fn is_available(&self) -> bool;

    /// Starts continuous delivery of samples into `sink`.
    ///
    /// # Returns
    /// * `Ok(WatchId)` - handle to pass to [`PositionSource::unsubscribe`]
    /// * `Err(SourceError::Unsupported)` - no positioning capability
    fn subscribe(&self, sink: SampleSink, options: WatchOptions) -> Result<WatchId, SourceError>;

    /// Stops delivery for a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: WatchId);

    /// Delivers exactly one sample (or error) into `sink`, independent of
    /// any continuous subscription.
    fn request_once(&self, sink: SampleSink, options: WatchOptions) -> Result<(), SourceError>;
}
