use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::ffi::ErrorCode;
use rusqlite::{Connection, Error as SqliteError, OpenFlags, OptionalExtension};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
}

#[derive(Clone)]
pub struct SqliteKeyValueStore {
    connection: Arc<Mutex<Connection>>,
    path: PathBuf,
    recovered: bool,
}

impl SqliteKeyValueStore {
    pub fn open<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(database_file);

        match establish_connection(&db_path) {
            Ok(connection) => {
                info!(
                    target: "storage",
                    path = %db_path.display(),
                    "key-value store ready"
                );
                Ok(Self::from_parts(connection, db_path, false))
            }
            Err(AppError::Database(err)) if should_attempt_recovery(&err, &db_path) => {
                warn!(
                    target: "storage",
                    path = %db_path.display(),
                    error = %err,
                    "key-value store failed to open, recreating it"
                );
                remove_store_files(&db_path)?;
                let connection = establish_connection(&db_path)?;
                Ok(Self::from_parts(connection, db_path, true))
            }
            Err(err) => Err(err),
        }
    }

    fn from_parts(connection: Connection, path: PathBuf, recovered: bool) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
            path,
            recovered,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recovered(&self) -> bool {
        self.recovered
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.connection.lock();
        conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()
        .map_err(AppError::from)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, DATETIME('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = DATETIME('now')",
            (key, value),
        )?;
        Ok(())
    }
}

fn establish_connection(db_path: &Path) -> AppResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(db_path, flags)?;
    connection.execute_batch("PRAGMA journal_mode = WAL;")?;
    run_migrations(&connection)?;
    Ok(connection)
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );
        "#,
    )?;
    Ok(())
}

fn should_attempt_recovery(err: &SqliteError, db_path: &Path) -> bool {
    if !db_path.exists() {
        return false;
    }

    match err {
        SqliteError::SqliteFailure(code, message) => {
            matches!(code.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
                || message
                    .as_deref()
                    .map(|msg| msg.contains("database disk image is malformed"))
                    .unwrap_or(false)
        }
        _ => false,
    }
}

fn remove_store_files(db_path: &Path) -> AppResult<()> {
    remove_if_exists(db_path)?;
    for suffix in ["-wal", "-shm"] {
        remove_if_exists(&sibling_path(db_path, suffix))?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> AppResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(err)),
    }
}

fn sibling_path(db_path: &Path, suffix: &str) -> PathBuf {
    let file_name = db_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    db_path.with_file_name(format!("{file_name}{suffix}"))
}

#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn runs_migrations_and_creates_table() {
        let dir = tempdir().unwrap();
        let store = SqliteKeyValueStore::open(dir.path(), "test.db").unwrap();
        let conn = store.connection.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = 'kv_store'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert!(store.path().ends_with("test.db"));
        assert!(!store.recovered());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SqliteKeyValueStore::open(dir.path(), "kv.db").unwrap();
            store.set("settings", "{\"a\":1}").unwrap();
            store.set("settings", "{\"a\":2}").unwrap();
        }
        let store = SqliteKeyValueStore::open(dir.path(), "kv.db").unwrap();
        assert_eq!(store.get("settings").unwrap().as_deref(), Some("{\"a\":2}"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn recovers_from_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.db");
        std::fs::write(&path, vec![0x42_u8; 4096]).unwrap();

        let store = SqliteKeyValueStore::open(dir.path(), "broken.db").unwrap();
        assert!(store.recovered());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));
    }
}
