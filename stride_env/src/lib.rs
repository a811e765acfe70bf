//! Stride Environment Abstraction Layer
//!
//! This crate provides the seams that let the stride tracking core run
//! against **real** positioning hardware or a **simulated** GPS without
//! knowing which one it is talking to.
//!
//! # Core Concept: Injected Sources
//!
//! Everything the tracker cannot compute by itself is behind a trait:
//! - Time (`now()`, `timestamp_ms()`, `spawn()`)
//! - Positions (`subscribe()`, `unsubscribe()`, `request_once()`)
//!
//! Sources never hold a reference to tracker state. They are handed a
//! [`SampleSink`] and push [`SourceEvent`]s into it.
//!
//! # Example
//!
//! ```ignore
//! use stride_env::{DeviceSource, PositionSource, SourceEvent, WatchOptions};
//! use std::sync::Arc;
//!
//! let (source, feed) = DeviceSource::new();
//! let id = source.subscribe(Arc::new(|event: SourceEvent| {
//!     println!("{:?}", event);
//! }), WatchOptions::continuous())?;
//!
//! feed.push_fix(payload);
//! source.unsubscribe(id);
//! ```

mod context;
mod device;
mod error;
mod source;
mod system_impl;
mod types;

pub use context::TrackerContext;
pub use device::{DeviceFeed, DeviceSource};
pub use error::SourceError;
pub use source::PositionSource;
pub use system_impl::SystemContext;
pub use types::{
    Coords, GeolocationPayload, RawSample, SampleOrigin, SampleSink, SourceEvent, WatchId,
    WatchOptions,
};
