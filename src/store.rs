use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Schema version written by `init_schema`.
pub const SCHEMA_VERSION: i32 = 1;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid state: {0}")]
    State(&'static str),
}

/// Durable string-keyed record store backed by a single SQLite table.
///
/// Every `put` is its own autocommitted statement, so a value is on disk by
/// the time the call returns. Higher layers (cache, ledger, queue) keep to
/// disjoint key namespaces and never need cross-key transactions.
pub struct KvStore {
    conn: Connection,
}

impl KvStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Volatile store, used by tests and force-offline demos.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wrap an existing connection and make sure the schema exists.
    pub fn from_connection(conn: Connection) -> Result<Self, SyncError> {
        let store = Self { conn };
        store.init_schema()?;
        store.migrate()?;
        Ok(store)
    }

    /// Create required tables. Safe to call multiple times.
    pub fn init_schema(&self) -> Result<(), SyncError> {
        self.conn.execute_batch(
            r#"
PRAGMA journal_mode=WAL;
PRAGMA synchronous=FULL;

CREATE TABLE IF NOT EXISTS kv (
k TEXT PRIMARY KEY,
v TEXT NOT NULL,
updated_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
k TEXT PRIMARY KEY,
v TEXT NOT NULL
);
"#,
        )?;
        self.conn.execute(
            "INSERT INTO store_meta(k,v) VALUES('schema_version',?1)
ON CONFLICT(k) DO NOTHING",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>, SyncError> {
        let v = self
            .conn
            .query_row("SELECT v FROM kv WHERE k=?1", params![key], |r| r.get(0))
            .optional()?;
        Ok(v)
    }

    pub fn put_raw(&self, key: &str, value: &str) -> Result<(), SyncError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO kv(k,v,updated_ms) VALUES(?1,?2,?3)
ON CONFLICT(k) DO UPDATE SET v=excluded.v, updated_ms=excluded.updated_ms",
            params![key, value, now_ms],
        )?;
        Ok(())
    }

    /// Read and deserialize the record stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` and overwrite whatever is stored under `key`.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        let raw = serde_json::to_string(value)?;
        self.put_raw(key, &raw)
    }

    /// Returns true when a record was actually removed.
    pub fn remove(&self, key: &str) -> Result<bool, SyncError> {
        let n = self.conn.execute("DELETE FROM kv WHERE k=?1", params![key])?;
        Ok(n > 0)
    }

    /// Keys starting with `prefix`, in lexical order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, SyncError> {
        // substr instead of LIKE: key prefixes contain '_' which LIKE treats as a wildcard
        let mut stmt = self
            .conn
            .prepare("SELECT k FROM kv WHERE substr(k, 1, length(?1)) = ?1 ORDER BY k ASC")?;
        let rows = stmt.query_map(params![prefix], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for k in rows {
            out.push(k?);
        }
        Ok(out)
    }

    /// Layout version recorded in `store_meta`.
    pub fn schema_version(&self) -> Result<i32, SyncError> {
        let raw: String = self.conn.query_row(
            "SELECT v FROM store_meta WHERE k='schema_version'",
            [],
            |r| r.get(0),
        )?;
        raw.trim()
            .parse()
            .map_err(|_| SyncError::State("unreadable schema_version"))
    }

    /// Bring an older file up to `SCHEMA_VERSION`. A file written by a newer
    /// build is refused instead of being read with the wrong layout.
    fn migrate(&self) -> Result<(), SyncError> {
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            return Err(SyncError::State("store was written by a newer schema"));
        }
        if current == SCHEMA_VERSION {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        // layout steps for versions after 1 go here, in order
        tx.execute(
            "UPDATE store_meta SET v=?1 WHERE k='schema_version'",
            params![SCHEMA_VERSION.to_string()],
        )?;
        tx.commit()?;
        tracing::info!(from = current, to = SCHEMA_VERSION, "store schema migrated");
        Ok(())
    }
}
