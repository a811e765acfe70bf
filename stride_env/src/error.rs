//! Error types for position sources.

use thiserror::Error;

/// Errors reported by a position source.
///
/// Mid-session failures are delivered as [`crate::SourceEvent::Error`] and
/// recorded by the tracker; they never end a session on their own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The user or platform revoked location permission
    #[error("Location permission denied")]
    PermissionDenied,

    /// The platform could not determine a position
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// No fix arrived within the requested timeout
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// No positioning capability on this platform
    #[error("Geolocation not supported")]
    Unsupported,

    /// The source was shut down
    #[error("Position source closed")]
    Closed,
}

impl SourceError {
    /// Creates a position-unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::PositionUnavailable(msg.into())
    }
}
