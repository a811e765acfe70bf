//! Tracker error types.

use stride_env::SourceError;
use thiserror::Error;

/// Errors surfaced across the tracker boundary.
///
/// Filtered-out samples are not errors; see [`crate::filter::SampleOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// The platform has no positioning capability
    #[error("Geolocation not supported")]
    Unsupported,

    /// The position source refused a request
    #[error("Position source error: {0}")]
    Source(#[from] SourceError),

    /// Lifecycle call not valid in the current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl TrackerError {
    /// Creates an invalid-state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
