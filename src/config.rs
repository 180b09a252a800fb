use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_REMINDERS_API_BASE: &str = "http://10.0.2.2:8001";
const DEFAULT_GOOGLE_PLACES_ENDPOINT: &str =
    "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
const DEFAULT_PLACES_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DISTANCE_FILTER_M: f64 = 100.0;
const DEFAULT_LOCATION_INTERVAL_MS: u64 = 30_000;
const DEFAULT_LOCATION_FASTEST_INTERVAL_MS: u64 = 10_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_file_name: String,
    pub reminders_api_base: String,
    pub reminders_api_token: Option<SecretString>,
    pub google_places_api_key: Option<SecretString>,
    pub google_places_endpoint: String,
    pub places_timeout_ms: u64,
    pub notification_outbox: Option<PathBuf>,
    pub location_distance_filter_m: f64,
    pub location_interval_ms: u64,
    pub location_fastest_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub data_dir: String,
    pub database_file_name: String,
    pub reminders_api_base: String,
    pub google_places_endpoint: String,
    pub places_timeout_ms: u64,
    pub notification_outbox: Option<String>,
    pub location_distance_filter_m: f64,
    pub location_interval_ms: u64,
    pub location_fastest_interval_ms: u64,
    pub has_reminders_api_token: bool,
    pub has_google_places_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| "location-reminders.db".to_string()),
            reminders_api_base: env::var("REMINDERS_API_BASE")
                .unwrap_or_else(|_| DEFAULT_REMINDERS_API_BASE.to_string()),
            reminders_api_token: parse_secret("REMINDERS_API_TOKEN"),
            google_places_api_key: parse_secret("GOOGLE_PLACES_API_KEY"),
            google_places_endpoint: env::var("GOOGLE_PLACES_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_PLACES_ENDPOINT.to_string()),
            places_timeout_ms: parse_u64("PLACES_TIMEOUT_MS", DEFAULT_PLACES_TIMEOUT_MS).max(1),
            notification_outbox: env::var("NOTIFICATION_OUTBOX")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            location_distance_filter_m: parse_f64(
                "LOCATION_DISTANCE_FILTER_M",
                DEFAULT_DISTANCE_FILTER_M,
            )
            .max(0.0),
            location_interval_ms: parse_u64("LOCATION_INTERVAL_MS", DEFAULT_LOCATION_INTERVAL_MS),
            location_fastest_interval_ms: parse_u64(
                "LOCATION_FASTEST_INTERVAL_MS",
                DEFAULT_LOCATION_FASTEST_INTERVAL_MS,
            ),
        }
    }

    pub fn places_timeout(&self) -> Duration {
        Duration::from_millis(self.places_timeout_ms)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file_name)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            data_dir: self.data_dir.to_string_lossy().to_string(),
            database_file_name: self.database_file_name.clone(),
            reminders_api_base: self.reminders_api_base.clone(),
            google_places_endpoint: self.google_places_endpoint.clone(),
            places_timeout_ms: self.places_timeout_ms,
            notification_outbox: self
                .notification_outbox
                .as_ref()
                .map(|path| path.to_string_lossy().to_string()),
            location_distance_filter_m: self.location_distance_filter_m,
            location_interval_ms: self.location_interval_ms,
            location_fastest_interval_ms: self.location_fastest_interval_ms,
            has_reminders_api_token: self.reminders_api_token.is_some(),
            has_google_places_key: self.google_places_api_key.is_some(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            database_file_name: "location-reminders.db".to_string(),
            reminders_api_base: DEFAULT_REMINDERS_API_BASE.to_string(),
            reminders_api_token: None,
            google_places_api_key: None,
            google_places_endpoint: DEFAULT_GOOGLE_PLACES_ENDPOINT.to_string(),
            places_timeout_ms: DEFAULT_PLACES_TIMEOUT_MS,
            notification_outbox: None,
            location_distance_filter_m: DEFAULT_DISTANCE_FILTER_M,
            location_interval_ms: DEFAULT_LOCATION_INTERVAL_MS,
            location_fastest_interval_ms: DEFAULT_LOCATION_FASTEST_INTERVAL_MS,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_secret(key: &str) -> Option<SecretString> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
