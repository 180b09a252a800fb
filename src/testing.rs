//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::{KeyValueStore, MemoryKeyValueStore};
use crate::errors::{AppError, AppResult};
use crate::geo::{Coordinate, EARTH_RADIUS_MILES};
use crate::ledger::Clock;
use crate::notifier::Notifier;
use crate::places::{PlaceCandidate, PlacesProvider};

/// Candidate due north of `origin`, `miles` away along the meridian.
pub fn candidate_at_miles(place_id: &str, origin: Coordinate, miles: f64) -> PlaceCandidate {
    let offset = (miles / EARTH_RADIUS_MILES).to_degrees();
    PlaceCandidate {
        place_id: place_id.to_string(),
        name: place_id.to_string(),
        location: Coordinate::new(origin.latitude + offset, origin.longitude),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacesCall {
    pub location: Coordinate,
    pub place_type: String,
    pub radius_meters: f64,
}

#[derive(Default)]
struct ScriptState {
    responses: HashMap<String, Vec<PlaceCandidate>>,
    failures: HashMap<String, bool>,
    rejections: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    calls: Vec<PlacesCall>,
}

/// Places provider answering from a per-place-type script.
#[derive(Clone, Default)]
pub struct ScriptedPlaces {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedPlaces {
    pub fn respond(&self, place_type: &str, candidates: Vec<PlaceCandidate>) {
        self.state
            .lock()
            .responses
            .insert(place_type.to_string(), candidates);
    }

    pub fn fail(&self, place_type: &str) {
        self.state
            .lock()
            .failures
            .insert(place_type.to_string(), true);
    }

    /// Fails `place_type` queries with a non-transient error.
    pub fn reject(&self, place_type: &str, reason: &str) {
        self.state
            .lock()
            .rejections
            .insert(place_type.to_string(), reason.to_string());
    }

    pub fn delay(&self, place_type: &str, delay: Duration) {
        self.state
            .lock()
            .delays
            .insert(place_type.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<PlacesCall> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl PlacesProvider for ScriptedPlaces {
    async fn find_nearby(
        &self,
        location: Coordinate,
        place_type: &str,
        radius_meters: f64,
    ) -> AppResult<Vec<PlaceCandidate>> {
        let (delay, failing, rejection, response) = {
            let mut state = self.state.lock();
            state.calls.push(PlacesCall {
                location,
                place_type: place_type.to_string(),
                radius_meters,
            });
            (
                state.delays.get(place_type).copied(),
                state.failures.get(place_type).copied().unwrap_or(false),
                state.rejections.get(place_type).cloned(),
                state.responses.get(place_type).cloned().unwrap_or_default(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(AppError::Provider("OVER_QUERY_LIMIT".into()));
        }
        if let Some(reason) = rejection {
            return Err(AppError::Validation(reason));
        }
        Ok(response)
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.sent
            .lock()
            .push((title.to_string(), message.to_string()));
    }
}

#[derive(Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// In-memory store whose writes can be made to fail on demand.
#[derive(Clone, Default)]
pub struct FlakyKeyValueStore {
    inner: MemoryKeyValueStore,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyKeyValueStore {
    pub fn fail_writes(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

impl KeyValueStore for FlakyKeyValueStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "simulated disk full",
            )));
        }
        self.inner.set(key, value)
    }
}
