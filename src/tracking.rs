use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::AppResult;
use crate::geo::Coordinate;
use crate::ledger::{Clock, LedgerStore};
use crate::location::{LocationSource, LocationStream, WatchOptions};
use crate::matcher::{NotificationRequest, ProximityMatcher};
use crate::notifier::Notifier;
use crate::places::PlacesProvider;
use crate::reminders::{CategoryIndex, ReminderStore};
use crate::settings::{Settings, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackingState {
    Stopped,
    Starting,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleSkip {
    NotificationsDisabled,
    ReminderStoreUnavailable,
    NoReminders,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub location: Coordinate,
    pub skipped: Option<CycleSkip>,
    pub categories: usize,
    pub queries: usize,
    pub failed_queries: usize,
    pub ledger_save_failures: usize,
    pub notifications: Vec<NotificationRequest>,
}

impl CycleReport {
    fn new(location: Coordinate) -> Self {
        Self {
            location,
            skipped: None,
            categories: 0,
            queries: 0,
            failed_queries: 0,
            ledger_save_failures: 0,
            notifications: Vec::new(),
        }
    }

    fn skipped(location: Coordinate, reason: CycleSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::new(location)
        }
    }
}

pub type CycleObserver = Arc<dyn Fn(&CycleReport) + Send + Sync>;

pub struct TrackingEngine {
    reminders: Arc<dyn ReminderStore>,
    settings: SettingsStore,
    ledger: LedgerStore,
    matcher: ProximityMatcher,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    cycle_guard: AsyncMutex<()>,
}

impl TrackingEngine {
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        places: Arc<dyn PlacesProvider>,
        settings: SettingsStore,
        ledger: LedgerStore,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            reminders,
            settings,
            ledger,
            matcher: ProximityMatcher::new(places, query_timeout),
            notifier,
            clock,
            cycle_guard: AsyncMutex::new(()),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Cycles never overlap: the ledger read-prune-write runs under one lock.
    pub async fn run_cycle(&self, location: Coordinate) -> CycleReport {
        let _cycle = self.cycle_guard.lock().await;

        let settings = self.settings.get();
        if !settings.notifications_enabled {
            debug!(target: "tracking", "notifications disabled; skipping cycle");
            return CycleReport::skipped(location, CycleSkip::NotificationsDisabled);
        }

        let reminders = match self.reminders.list_active().await {
            Ok(reminders) => reminders,
            Err(err) => {
                warn!(target: "tracking", error = ?err, "failed to load reminders; skipping cycle");
                return CycleReport::skipped(location, CycleSkip::ReminderStoreUnavailable);
            }
        };
        let index = CategoryIndex::group_by_category(&reminders);
        if index.is_empty() {
            return CycleReport::skipped(location, CycleSkip::NoReminders);
        }

        let now = self.clock.now_millis();
        let loaded = self.ledger.load();
        let loaded_len = loaded.len();
        let ledger = loaded.prune(now);
        let evicted = loaded_len - ledger.len();

        let mut report = CycleReport::new(location);
        report.categories = index.len();
        let mut save_failures = 0;
        let notifier = &self.notifier;
        let ledger_store = &self.ledger;
        let outcome = self
            .matcher
            .run(location, &index, &settings, ledger, now, |request, ledger| {
                // Notify before persisting: a crash in between repeats a notification
                // instead of losing one.
                notifier.notify(&request.title, &request.message);
                if let Err(err) = ledger_store.save(ledger) {
                    warn!(
                        target: "tracking",
                        error = ?err,
                        place_id = %request.place_id,
                        "failed to persist notification ledger"
                    );
                    save_failures += 1;
                }
            })
            .await;

        if outcome.requests.is_empty() && evicted > 0 {
            if let Err(err) = self.ledger.save(&outcome.ledger) {
                warn!(target: "tracking", error = ?err, "failed to persist pruned ledger");
                save_failures += 1;
            }
        }

        report.queries = outcome.queries;
        report.failed_queries = outcome.failed_queries;
        report.ledger_save_failures = save_failures;
        report.notifications = outcome.requests;
        info!(
            target: "tracking",
            categories = report.categories,
            failed_queries = report.failed_queries,
            notifications = report.notifications.len(),
            "tracking cycle complete"
        );
        report
    }
}

struct WatchSession {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WatchSession {
    fn release(self) {
        let _ = self.shutdown.send(());
        drop(self.task);
    }
}

pub struct TrackingController {
    engine: Arc<TrackingEngine>,
    source: Arc<dyn LocationSource>,
    options: WatchOptions,
    state: Mutex<TrackingState>,
    session: Mutex<Option<WatchSession>>,
    observer: Option<CycleObserver>,
}

impl TrackingController {
    pub fn new(
        engine: Arc<TrackingEngine>,
        source: Arc<dyn LocationSource>,
        options: WatchOptions,
    ) -> Self {
        Self {
            engine,
            source,
            options,
            state: Mutex::new(TrackingState::Stopped),
            session: Mutex::new(None),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: CycleObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn engine(&self) -> &Arc<TrackingEngine> {
        &self.engine
    }

    pub fn state(&self) -> TrackingState {
        let mut session = self.session.lock();
        if session
            .as_ref()
            .map(|active| active.task.is_finished())
            .unwrap_or(false)
        {
            // The location stream ended on its own.
            *session = None;
            *self.state.lock() = TrackingState::Stopped;
        }
        *self.state.lock()
    }

    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> AppResult<TrackingState> {
        self.stop();
        self.set_state(TrackingState::Starting);

        let settings = self.engine.settings().get();
        if !settings.location_tracking {
            info!(target: "tracking", "location tracking disabled in settings");
            self.set_state(TrackingState::Stopped);
            return Ok(TrackingState::Stopped);
        }

        let stream = match self.source.watch(&self.options) {
            Ok(stream) => stream,
            Err(err) => {
                self.set_state(TrackingState::Stopped);
                return Err(err);
            }
        };

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(watch_loop(
            Arc::clone(&self.engine),
            stream,
            shutdown_rx,
            self.observer.clone(),
        ));
        *self.session.lock() = Some(WatchSession { shutdown, task });
        self.set_state(TrackingState::Active);
        info!(
            target: "tracking",
            radius_miles = settings.search_radius_miles,
            distance_filter_m = self.options.distance_filter_meters,
            "location tracking started"
        );
        Ok(TrackingState::Active)
    }

    pub fn stop(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.release();
            info!(target: "tracking", "location tracking stopped");
        }
        self.set_state(TrackingState::Stopped);
    }

    pub fn update_settings(&self, settings: Settings) -> AppResult<TrackingState> {
        self.engine.settings().save(&settings)?;
        if settings.location_tracking {
            self.start()
        } else {
            self.stop();
            Ok(TrackingState::Stopped)
        }
    }

    pub async fn run_cycle(&self, location: Coordinate) -> CycleReport {
        self.engine.run_cycle(location).await
    }

    fn set_state(&self, state: TrackingState) {
        *self.state.lock() = state;
    }
}

impl Drop for TrackingController {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.release();
        }
    }
}

async fn watch_loop(
    engine: Arc<TrackingEngine>,
    mut stream: LocationStream,
    mut shutdown: oneshot::Receiver<()>,
    observer: Option<CycleObserver>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            sample = stream.next() => match sample {
                Some(Ok(location)) => {
                    let report = engine.run_cycle(location).await;
                    if let Some(observer) = &observer {
                        observer(&report);
                    }
                }
                Some(Err(err)) => {
                    warn!(target: "tracking", error = ?err, "location update failed; waiting for next sample");
                }
                None => {
                    info!(target: "tracking", "location stream ended");
                    break;
                }
            },
        }
    }
}
