use std::sync::Arc;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::KeyValueStore;
use crate::errors::{AppError, AppResult};

pub const SETTINGS_KEY: &str = "settings";
pub const MIN_RADIUS_MILES: f64 = 0.1;
pub const MAX_RADIUS_MILES: f64 = 10.0;
const DEFAULT_RADIUS_MILES: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub notifications_enabled: bool,
    pub location_tracking: bool,
    #[serde(rename = "searchRadius", deserialize_with = "number_or_string")]
    pub search_radius_miles: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            location_tracking: true,
            search_radius_miles: DEFAULT_RADIUS_MILES,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> AppResult<()> {
        let radius = self.search_radius_miles;
        if !radius.is_finite() || !(MIN_RADIUS_MILES..=MAX_RADIUS_MILES).contains(&radius) {
            return Err(AppError::Validation(format!(
                "search radius {radius} outside [{MIN_RADIUS_MILES}, {MAX_RADIUS_MILES}] miles"
            )));
        }
        Ok(())
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Radius {
        Number(f64),
        Text(String),
    }

    match Radius::deserialize(deserializer)? {
        Radius::Number(value) => Ok(value),
        Radius::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("invalid search radius {text:?}"))),
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn get(&self) -> Settings {
        let stored = match self.kv.get(SETTINGS_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!(target: "settings", "no stored settings; using defaults");
                return Settings::default();
            }
            Err(err) => {
                warn!(target: "settings", error = ?err, "failed to read settings; using defaults");
                return Settings::default();
            }
        };

        let parsed = serde_json::from_str::<Settings>(&stored)
            .map_err(AppError::from)
            .and_then(|settings| settings.validate().map(|()| settings));
        match parsed {
            Ok(settings) => settings,
            Err(err) => {
                warn!(
                    target: "settings",
                    error = ?err,
                    "stored settings are malformed; using defaults"
                );
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) -> AppResult<()> {
        settings.validate()?;
        let serialized = serde_json::to_string(settings)?;
        self.kv.set(SETTINGS_KEY, &serialized)
    }
}
