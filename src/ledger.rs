use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::db::KeyValueStore;
use crate::errors::AppResult;

pub const LEDGER_KEY: &str = "notifiedPlaces";
pub const COOLDOWN_WINDOW_MS: i64 = 60 * 60 * 1000;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedEntry {
    pub place_id: String,
    #[serde(alias = "timestamp")]
    pub notified_at_epoch_millis: i64,
}

impl NotifiedEntry {
    fn is_live(&self, now: i64) -> bool {
        now.saturating_sub(self.notified_at_epoch_millis) < COOLDOWN_WINDOW_MS
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationLedger {
    entries: HashMap<String, NotifiedEntry>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = NotifiedEntry>) -> Self {
        let mut ledger = Self::new();
        for entry in entries {
            // Duplicate ids keep the most recent notification.
            match ledger.entries.get(&entry.place_id) {
                Some(existing)
                    if existing.notified_at_epoch_millis >= entry.notified_at_epoch_millis => {}
                _ => {
                    ledger.entries.insert(entry.place_id.clone(), entry);
                }
            }
        }
        ledger
    }

    pub fn prune(mut self, now: i64) -> Self {
        self.entries.retain(|_, entry| entry.is_live(now));
        self
    }

    /// Only meaningful after `prune` for the current cycle.
    pub fn is_notified(&self, place_id: &str) -> bool {
        self.entries.contains_key(place_id)
    }

    pub fn record(mut self, place_id: &str, now: i64) -> Self {
        self.entries.insert(
            place_id.to_string(),
            NotifiedEntry {
                place_id: place_id.to_string(),
                notified_at_epoch_millis: now,
            },
        );
        self
    }

    pub fn get(&self, place_id: &str) -> Option<&NotifiedEntry> {
        self.entries.get(place_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<&NotifiedEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            a.notified_at_epoch_millis
                .cmp(&b.notified_at_epoch_millis)
                .then_with(|| a.place_id.cmp(&b.place_id))
        });
        entries
    }
}

#[derive(Clone)]
pub struct LedgerStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LedgerStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn load(&self) -> NotificationLedger {
        let stored = match self.kv.get(LEDGER_KEY) {
            Ok(Some(stored)) => stored,
            Ok(None) => return NotificationLedger::new(),
            Err(err) => {
                warn!(target: "ledger", error = ?err, "failed to read notification ledger");
                return NotificationLedger::new();
            }
        };

        match serde_json::from_str::<Vec<NotifiedEntry>>(&stored) {
            Ok(entries) => NotificationLedger::from_entries(entries),
            Err(err) => {
                warn!(
                    target: "ledger",
                    error = ?err,
                    "discarding unreadable notification ledger"
                );
                NotificationLedger::new()
            }
        }
    }

    pub fn save(&self, ledger: &NotificationLedger) -> AppResult<()> {
        let serialized = serde_json::to_string(&ledger.entries())?;
        self.kv.set(LEDGER_KEY, &serialized)?;
        trace!(target: "ledger", entries = ledger.len(), "notification ledger persisted");
        Ok(())
    }
}
