mod backend;
mod config;
mod db;
mod errors;
mod geo;
mod ledger;
mod location;
mod matcher;
mod notifier;
mod places;
mod reminders;
mod settings;
#[cfg(test)]
mod testing;
mod tracking;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use backend::BackendClient;
pub use config::{AppConfig, PublicAppConfig};
pub use db::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use errors::{AppError, AppResult};
pub use geo::{distance_miles, meters_to_miles, miles_to_meters, Coordinate, EARTH_RADIUS_MILES};
pub use ledger::{
    Clock, LedgerStore, NotificationLedger, NotifiedEntry, SystemClock, COOLDOWN_WINDOW_MS,
    LEDGER_KEY,
};
pub use location::{
    with_distance_filter, ChannelLocationSource, LocationSource, LocationStream, WatchOptions,
    SAMPLE_QUEUE_CAPACITY,
};
pub use matcher::{first_qualifying, MatchOutcome, NotificationRequest, ProximityMatcher};
pub use notifier::{Notifier, OutboxNotifier, TracingNotifier};
pub use places::{GooglePlacesClient, PlaceCandidate, PlacesProvider, PlacesService};
pub use reminders::{
    Category, CategoryGroup, CategoryIndex, MemoryReminderStore, Reminder, ReminderStore,
};
pub use settings::{Settings, SettingsStore, SETTINGS_KEY};
pub use tracking::{
    CycleObserver, CycleReport, CycleSkip, TrackingController, TrackingEngine, TrackingState,
};

pub struct ReminderRuntime {
    config: AppConfig,
    storage: SqliteKeyValueStore,
    backend: BackendClient,
    controller: TrackingController,
}

impl ReminderRuntime {
    pub fn initialize(config: AppConfig, source: Arc<dyn LocationSource>) -> AppResult<Self> {
        init_tracing();
        let storage = SqliteKeyValueStore::open(&config.data_dir, &config.database_file_name)?;
        let backend = BackendClient::new(
            config.reminders_api_base.clone(),
            config.reminders_api_token.clone(),
        )?;
        let places = PlacesService::new(&config, &backend)?;
        let notifier: Arc<dyn Notifier> = match &config.notification_outbox {
            Some(path) => Arc::new(OutboxNotifier::new(path)?),
            None => Arc::new(TracingNotifier),
        };

        let kv: Arc<dyn KeyValueStore> = Arc::new(storage.clone());
        let engine = TrackingEngine::new(
            Arc::new(backend.clone()),
            Arc::new(places),
            SettingsStore::new(Arc::clone(&kv)),
            LedgerStore::new(kv),
            notifier,
            Arc::new(SystemClock),
            config.places_timeout(),
        );
        let controller =
            TrackingController::new(Arc::new(engine), source, WatchOptions::from_config(&config));

        info!(
            target: "tracking",
            storage = %storage.path().display(),
            storage_recovered = storage.recovered(),
            has_places_key = config.google_places_api_key.is_some(),
            "reminder runtime initialized"
        );
        Ok(Self {
            config,
            storage,
            backend,
            controller,
        })
    }

    pub fn controller(&self) -> &TrackingController {
        &self.controller
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn storage(&self) -> &SqliteKeyValueStore {
        &self.storage
    }

    pub fn public_config(&self) -> PublicAppConfig {
        self.config.public_profile()
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,proximity_reminders=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn initializes_runtime_with_local_storage() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            notification_outbox: Some(dir.path().join("outbox.jsonl")),
            ..AppConfig::default()
        };
        let source = ChannelLocationSource::new();
        let runtime = ReminderRuntime::initialize(config, Arc::new(source.clone())).unwrap();

        assert!(runtime.storage().path().starts_with(dir.path()));
        assert!(dir.path().join("outbox.jsonl").exists());
        assert!(!runtime.public_config().has_google_places_key);
        assert_eq!(runtime.controller().state(), TrackingState::Stopped);

        assert_eq!(runtime.controller().start().unwrap(), TrackingState::Active);
        assert!(source.has_subscriber());
        runtime.controller().stop();
    }
}
