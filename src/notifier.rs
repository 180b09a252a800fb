use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppResult;

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!(target: "notifier", title, message, "notification");
    }
}

pub struct OutboxNotifier {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, Serialize)]
struct OutboxRecord<'a> {
    title: &'a str,
    message: &'a str,
    timestamp: DateTime<Utc>,
}

impl OutboxNotifier {
    pub fn new<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, title: &str, message: &str) -> AppResult<()> {
        let mut line = serde_json::to_vec(&OutboxRecord {
            title,
            message,
            timestamp: Utc::now(),
        })?;
        line.push(b'\n');

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, title: &str, message: &str) {
        if let Err(err) = self.append(title, message) {
            warn!(
                target: "notifier",
                error = ?err,
                path = %self.path.display(),
                "failed to write notification to outbox"
            );
        }
    }
}
