//! Production position source fed by platform glue.
//!
//! The platform layer (a gpsd client, a mobile bridge, a log replayer) owns
//! the [`DeviceFeed`] and pushes fixes into it. The tracker owns the
//! [`DeviceSource`] and subscribes through [`PositionSource`].

use crate::error::SourceError;
use crate::source::PositionSource;
use crate::types::{RawSample, SampleSink, SourceEvent, WatchId, WatchOptions};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Last fix seen by the hub, kept for `maximum_age_ms` requests.
struct CachedFix {
    payload: serde_json::Value,
    received: Instant,
}

/// State shared between a source and its feed.
#[derive(Default)]
struct DeviceHub {
    next_id: u64,
    watchers: BTreeMap<WatchId, (SampleSink, WatchOptions)>,
    pending_once: Vec<SampleSink>,
    last_fix: Option<CachedFix>,
}

fn lock(hub: &Mutex<DeviceHub>) -> MutexGuard<'_, DeviceHub> {
    // A panicking sink cannot leave the hub half-updated: sinks run outside the lock
    hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Position source backed by real hardware.
pub struct DeviceSource {
    available: bool,
    hub: Arc<Mutex<DeviceHub>>,
}

/// Producer half of a [`DeviceSource`].
#[derive(Clone)]
pub struct DeviceFeed {
    hub: Arc<Mutex<DeviceHub>>,
}

impl DeviceSource {
    /// Creates a source with positioning capability and its feed.
    pub fn new() -> (Self, DeviceFeed) {
        Self::with_capability(true)
    }

    /// Creates a source for a platform without positioning.
    ///
    /// `subscribe` and `request_once` fail with [`SourceError::Unsupported`].
    pub fn unavailable() -> (Self, DeviceFeed) {
        Self::with_capability(false)
    }

    fn with_capability(available: bool) -> (Self, DeviceFeed) {
        let hub = Arc::new(Mutex::new(DeviceHub::default()));
        let source = Self {
            available,
            hub: Arc::clone(&hub),
        };
        (source, DeviceFeed { hub })
    }

    /// Number of live subscriptions.
    pub fn watch_count(&self) -> usize {
        lock(&self.hub).watchers.len()
    }
}

impl PositionSource for DeviceSource {
    fn is_available(&self) -> bool {
        self.available
    }

    fn subscribe(&self, sink: SampleSink, options: WatchOptions) -> Result<WatchId, SourceError> {
        if !self.available {
            return Err(SourceError::Unsupported);
        }

        let mut hub = lock(&self.hub);
        hub.next_id += 1;
        let id = WatchId(hub.next_id);
        hub.watchers.insert(id, (sink, options));
        tracing::debug!(%id, ?options, "device watch registered");
        Ok(id)
    }

    fn unsubscribe(&self, id: WatchId) {
        if lock(&self.hub).watchers.remove(&id).is_some() {
            tracing::debug!(%id, "device watch cleared");
        }
    }

    fn request_once(&self, sink: SampleSink, options: WatchOptions) -> Result<(), SourceError> {
        if !self.available {
            return Err(SourceError::Unsupported);
        }

        let cached = {
            let mut hub = lock(&self.hub);
            let fresh = hub.last_fix.as_ref().and_then(|fix| {
                let max_age = Duration::from_millis(options.maximum_age_ms);
                (options.maximum_age_ms > 0 && fix.received.elapsed() <= max_age)
                    .then(|| fix.payload.clone())
            });
            if fresh.is_none() {
                hub.pending_once.push(Arc::clone(&sink));
            }
            fresh
        };

        if let Some(payload) = cached {
            sink(SourceEvent::Sample(RawSample::device(payload)));
        }
        Ok(())
    }
}

impl DeviceFeed {
    /// Pushes a fix to every subscriber and pending one-shot request.
    ///
    /// Returns the number of sinks the fix was delivered to.
    pub fn push_fix(&self, payload: serde_json::Value) -> usize {
        let sinks = {
            let mut hub = lock(&self.hub);
            hub.last_fix = Some(CachedFix {
                payload: payload.clone(),
                received: Instant::now(),
            });
            let mut sinks: Vec<SampleSink> =
                hub.watchers.values().map(|(sink, _)| Arc::clone(sink)).collect();
            sinks.append(&mut hub.pending_once);
            sinks
        };

        for sink in &sinks {
            sink(SourceEvent::Sample(RawSample::device(payload.clone())));
        }
        sinks.len()
    }

    /// Reports a platform failure to every subscriber and pending request.
    pub fn push_error(&self, error: SourceError) -> usize {
        let sinks = {
            let mut hub = lock(&self.hub);
            let mut sinks: Vec<SampleSink> =
                hub.watchers.values().map(|(sink, _)| Arc::clone(sink)).collect();
            sinks.append(&mut hub.pending_once);
            sinks
        };

        for sink in &sinks {
            sink(SourceEvent::Error(error.clone()));
        }
        sinks.len()
    }

    /// Options of the live subscriptions, for the platform to honor.
    pub fn active_options(&self) -> Vec<WatchOptions> {
        lock(&self.hub).watchers.values().map(|(_, opts)| *opts).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeolocationPayload;

    fn recording_sink() -> (SampleSink, Arc<Mutex<Vec<SourceEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&events);
        let sink: SampleSink = Arc::new(move |event| captured.lock().unwrap().push(event));
        (sink, events)
    }

    fn fix() -> serde_json::Value {
        GeolocationPayload::new(50.0, 30.0, 5.0, 1_000).to_value()
    }

    #[test]
    fn test_subscribe_and_deliver() {
        let (source, feed) = DeviceSource::new();
        let (sink, events) = recording_sink();

        let id = source.subscribe(sink, WatchOptions::continuous()).unwrap();
        assert_eq!(source.watch_count(), 1);
        assert_eq!(feed.push_fix(fix()), 1);

        source.unsubscribe(id);
        assert_eq!(feed.push_fix(fix()), 0);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SourceEvent::Sample(s) if s.origin == crate::SampleOrigin::Device));
    }

    #[test]
    fn test_unavailable_source() {
        let (source, _feed) = DeviceSource::unavailable();
        let (sink, _) = recording_sink();

        assert!(!source.is_available());
        assert_eq!(
            source.subscribe(Arc::clone(&sink), WatchOptions::continuous()),
            Err(SourceError::Unsupported)
        );
        assert_eq!(
            source.request_once(sink, WatchOptions::one_shot()),
            Err(SourceError::Unsupported)
        );
    }

    #[test]
    fn test_request_once_fires_once() {
        let (source, feed) = DeviceSource::new();
        let (sink, events) = recording_sink();

        source.request_once(sink, WatchOptions::one_shot()).unwrap();
        feed.push_fix(fix());
        feed.push_fix(fix());

        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_request_once_uses_fresh_cache() {
        let (source, feed) = DeviceSource::new();
        feed.push_fix(fix());

        let (sink, events) = recording_sink();
        let options = WatchOptions {
            maximum_age_ms: 60_000,
            ..WatchOptions::one_shot()
        };
        source.request_once(sink, options).unwrap();

        // Served from cache immediately, nothing left pending
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(feed.push_fix(fix()), 0);
    }

    #[test]
    fn test_errors_reach_watchers() {
        let (source, feed) = DeviceSource::new();
        let (sink, events) = recording_sink();
        source.subscribe(sink, WatchOptions::continuous()).unwrap();

        feed.push_error(SourceError::PermissionDenied);

        let events = events.lock().unwrap();
        assert_eq!(events[0], SourceEvent::Error(SourceError::PermissionDenied));
        assert_eq!(feed.active_options(), vec![WatchOptions::continuous()]);
    }
}
