use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::geo::{distance_miles, miles_to_meters, Coordinate};

pub type LocationStream = Pin<Box<dyn Stream<Item = AppResult<Coordinate>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub distance_filter_meters: f64,
    pub interval: Duration,
    pub fastest_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            distance_filter_meters: 100.0,
            interval: Duration::from_secs(30),
            fastest_interval: Duration::from_secs(10),
        }
    }
}

impl WatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            high_accuracy: true,
            distance_filter_meters: config.location_distance_filter_m,
            interval: Duration::from_millis(config.location_interval_ms),
            fastest_interval: Duration::from_millis(config.location_fastest_interval_ms),
        }
    }
}

pub trait LocationSource: Send + Sync {
    fn watch(&self, options: &WatchOptions) -> AppResult<LocationStream>;
}

pub fn with_distance_filter(stream: LocationStream, min_meters: f64) -> LocationStream {
    if min_meters <= 0.0 {
        return stream;
    }
    let mut last_accepted: Option<Coordinate> = None;
    Box::pin(stream.filter(move |sample| {
        let keep = match sample {
            Ok(location) => match last_accepted {
                Some(previous)
                    if miles_to_meters(distance_miles(previous, *location)) < min_meters =>
                {
                    trace!(target: "location", "sample within movement filter; dropped");
                    false
                }
                _ => {
                    last_accepted = Some(*location);
                    true
                }
            },
            Err(_) => true,
        };
        future::ready(keep)
    }))
}

pub const SAMPLE_QUEUE_CAPACITY: usize = 8;

type Subscriber = mpsc::Sender<AppResult<Coordinate>>;

/// Location source fed by the host through [`ChannelLocationSource::push`].
///
/// Each `watch` call replaces the previous subscriber, whose stream then ends.
/// At most [`SAMPLE_QUEUE_CAPACITY`] samples wait behind a running cycle;
/// `push` drops newer samples while the queue is full.
#[derive(Clone, Default)]
pub struct ChannelLocationSource {
    subscriber: Arc<Mutex<Option<Subscriber>>>,
    dropped: Arc<AtomicU64>,
}

impl ChannelLocationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, location: Coordinate) -> bool {
        self.send(Ok(location))
    }

    pub fn push_error(&self, message: impl Into<String>) -> bool {
        self.send(Err(AppError::Location(message.into())))
    }

    /// Waits for queue space instead of dropping. Must not be called from async code.
    pub fn push_blocking(&self, location: Coordinate) -> bool {
        let Some(sender) = self.subscriber.lock().clone() else {
            return false;
        };
        sender.blocking_send(Ok(location)).is_ok()
    }

    pub fn close(&self) {
        self.subscriber.lock().take();
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber
            .lock()
            .as_ref()
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, sample: AppResult<Coordinate>) -> bool {
        let mut subscriber = self.subscriber.lock();
        let Some(sender) = subscriber.as_ref() else {
            return false;
        };
        match sender.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 10 == 1 {
                    warn!(target: "location", dropped, "sample queue full; dropping samples");
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                *subscriber = None;
                false
            }
        }
    }
}

impl LocationSource for ChannelLocationSource {
    fn watch(&self, options: &WatchOptions) -> AppResult<LocationStream> {
        let (sender, receiver) = mpsc::channel(SAMPLE_QUEUE_CAPACITY);
        *self.subscriber.lock() = Some(sender);
        let samples = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|sample| (sample, receiver))
        });
        Ok(with_distance_filter(
            Box::pin(samples),
            options.distance_filter_meters,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filters_small_movements() {
        let source = ChannelLocationSource::new();
        let mut stream = source.watch(&WatchOptions::default()).unwrap();

        let start = Coordinate::new(37.0, -122.0);
        // Roughly 11 m and 1.1 km north of the start.
        let nudge = Coordinate::new(37.0001, -122.0);
        let moved = Coordinate::new(37.01, -122.0);
        assert!(source.push(start));
        assert!(source.push(nudge));
        assert!(source.push_error("gps lost"));
        assert!(source.push(moved));

        assert_eq!(stream.next().await.unwrap().unwrap(), start);
        assert!(stream.next().await.unwrap().is_err());
        assert_eq!(stream.next().await.unwrap().unwrap(), moved);
    }

    #[tokio::test]
    async fn new_watch_replaces_previous_subscription() {
        let source = ChannelLocationSource::new();
        let options = WatchOptions {
            distance_filter_meters: 0.0,
            ..WatchOptions::default()
        };
        let mut first = source.watch(&options).unwrap();
        let mut second = source.watch(&options).unwrap();

        assert!(first.next().await.is_none());
        assert!(source.push(Coordinate::new(1.0, 2.0)));
        assert_eq!(
            second.next().await.unwrap().unwrap(),
            Coordinate::new(1.0, 2.0)
        );

        drop(second);
        assert!(!source.push(Coordinate::new(1.0, 2.0)));
        assert!(!source.has_subscriber());
    }

    #[tokio::test]
    async fn close_drains_queued_samples_before_ending() {
        let source = ChannelLocationSource::new();
        let mut stream = source
            .watch(&WatchOptions {
                distance_filter_meters: 0.0,
                ..WatchOptions::default()
            })
            .unwrap();
        assert!(source.push(Coordinate::new(1.0, 1.0)));
        source.close();

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());
        assert!(!source.push(Coordinate::new(1.0, 1.0)));
    }

    #[tokio::test]
    async fn full_queue_drops_newer_samples() {
        let source = ChannelLocationSource::new();
        let mut stream = source
            .watch(&WatchOptions {
                distance_filter_meters: 0.0,
                ..WatchOptions::default()
            })
            .unwrap();

        for i in 0..SAMPLE_QUEUE_CAPACITY {
            assert!(source.push(Coordinate::new(i as f64, 0.0)));
        }
        assert!(!source.push(Coordinate::new(45.0, 0.0)));
        assert!(!source.push_error("gps lost"));
        assert_eq!(source.dropped_samples(), 2);
        assert!(source.has_subscriber());

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Coordinate::new(0.0, 0.0)
        );
        assert!(source.push(Coordinate::new(46.0, 0.0)));
    }

    #[test]
    fn builds_options_from_config() {
        let config = AppConfig {
            location_distance_filter_m: 50.0,
            location_interval_ms: 60_000,
            ..AppConfig::default()
        };
        let options = WatchOptions::from_config(&config);
        assert_eq!(options.distance_filter_meters, 50.0);
        assert_eq!(options.interval, Duration::from_secs(60));
        assert_eq!(options.fastest_interval, Duration::from_secs(10));
        assert!(options.high_accuracy);
    }
}
