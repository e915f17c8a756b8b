//! `ConfigStore` — a named key-value store in a single SQLite file.
//!
//! Schema (one table per file):
//! ```text
//! config(key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at TEXT NOT NULL)
//! ```
//!
//! `value` holds the JSON encoding of whatever was passed to [`ConfigStore::set`].
//! Presence is the existence of the row, so a stored `false`, `0`, `""` or
//! `null` reads back as `Some(..)` and never falls through to a default.
//!
//! Every `set` is an autocommit statement with `synchronous = FULL`; the value
//! is on disk when `set` returns.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::AppError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS config (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

/// Persistent key-value store backed by one database file.
///
/// The connection sits behind a mutex: one writer per backing file within
/// this process.
pub struct ConfigStore {
    name: String,
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl ConfigStore {
    /// Open (or create) `base_dir/name`.
    pub fn open(base_dir: &Path, name: &str) -> Result<Self, AppError> {
        std::fs::create_dir_all(base_dir).map_err(|e| {
            AppError::Store(format!("cannot create {}: {e}", base_dir.display()))
        })?;
        let path = base_dir.join(name);

        let conn = Connection::open(&path)
            .map_err(|e| AppError::Store(format!("cannot open {}: {e}", path.display())))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| AppError::Store(format!("pragma synchronous on {name}: {e}")))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|e| AppError::Store(format!("pragma busy_timeout on {name}: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Store(format!("init schema in {name}: {e}")))?;

        debug!(store = name, path = %path.display(), "config store opened");

        Ok(Self {
            name: name.to_string(),
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Store(format!("store '{}' lock poisoned", self.name)))
    }

    /// Stored value for `key`, or `None` if the key was never set.
    pub fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM config WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| AppError::Store(format!("get '{key}' from {}: {e}", self.name)))?;

        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| {
                AppError::Store(format!("malformed value for '{key}' in {}: {e}", self.name))
            })
        })
        .transpose()
    }

    /// Stored value for `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value, AppError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Typed read. Absent → `Ok(None)`; present but wrong shape → error.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        self.get(key)?
            .map(|v| {
                serde_json::from_value(v).map_err(|e| {
                    AppError::Store(format!("value for '{key}' has unexpected shape: {e}"))
                })
            })
            .transpose()
    }

    /// String read; non-string values are treated as a shape error.
    pub fn get_str(&self, key: &str) -> Result<Option<String>, AppError> {
        self.get_as::<String>(key)
    }

    pub fn contains(&self, key: &str) -> Result<bool, AppError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM config WHERE key = ?1)",
            params![key],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Store(format!("contains '{key}' in {}: {e}", self.name)))
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>, AppError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT key FROM config ORDER BY key")
            .map_err(|e| AppError::Store(format!("list keys in {}: {e}", self.name)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| AppError::Store(format!("list keys in {}: {e}", self.name)))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Store(format!("list keys in {}: {e}", self.name)))
    }

    /// Write `value` under `key`. Durable on return; last write wins.
    pub fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<(), AppError> {
        let encoded = serde_json::to_string(value)
            .map_err(|e| AppError::Store(format!("serialise value for '{key}': {e}")))?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, encoded, now],
        )
        .map_err(|e| AppError::Store(format!("set '{key}' in {}: {e}", self.name)))?;

        trace!(store = %self.name, key, bytes = encoded.len(), "config value written");
        Ok(())
    }

    /// Seed `keys` from the process environment (after loading `.env`).
    ///
    /// Returns how many keys were written.
    pub fn initialize_keys(&self, keys: &[&str]) -> Result<usize, AppError> {
        let _ = dotenvy::dotenv();
        self.initialize_keys_with(keys, |k| std::env::var(k).ok())
    }

    /// Seed `keys` using `lookup`. Missing or empty values are skipped, so
    /// existing entries are never blanked.
    pub fn initialize_keys_with(
        &self,
        keys: &[&str],
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<usize, AppError> {
        let mut written = 0;
        for &key in keys {
            match lookup(key) {
                Some(value) if !value.is_empty() => {
                    self.set(key, &value)?;
                    written += 1;
                }
                _ => trace!(store = %self.name, key, "env key not set, skipping"),
            }
        }
        debug!(store = %self.name, requested = keys.len(), written, "keys initialised");
        Ok(written)
    }

    /// Release the connection.
    pub fn close(self) -> Result<(), AppError> {
        let name = self.name;
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| AppError::Store(format!("store '{name}' lock poisoned")))?;
        conn.close()
            .map_err(|(_, e)| AppError::Store(format!("close {name}: {e}")))?;
        debug!(store = %name, "config store closed");
        Ok(())
    }
}
