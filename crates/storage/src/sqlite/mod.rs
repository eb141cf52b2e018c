#![forbid(unsafe_code)]

mod current;
mod history;
mod schema;

pub use current::SqliteCurrentStore;
pub use history::SqliteHistoryStore;

use crate::error::StoreError;
use docrev_core::{DocumentId, Payload, VersionedRecord, history_collection_name};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE_NAME: &str = "docrev.db";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_COLLECTION_NAME_LEN: usize = 96;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Upper bound on how long a single statement waits for a competing writer's lock.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// A SQLite database file holding any number of current/history collection pairs.
///
/// Every handle returned by [`SqliteStore::current`] or [`SqliteStore::history`] owns its own
/// connection, so writers on different threads coordinate only through the database.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    db_path: PathBuf,
    options: StoreOptions,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(storage_dir, StoreOptions::default())
    }

    pub fn open_with(
        storage_dir: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let store = Self {
            db_path: storage_dir.join(DB_FILE_NAME),
            options,
        };
        let conn = store.connect()?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        tracing::debug!(path = %store.db_path.display(), %journal_mode, "opened document store");
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn current(&self, collection: &str) -> Result<SqliteCurrentStore, StoreError> {
        let table = canonicalize_collection(collection)?;
        let conn = self.connect()?;
        schema::install_current(&conn, &table)?;
        Ok(SqliteCurrentStore::new(conn, table))
    }

    pub fn history(&self, collection: &str) -> Result<SqliteHistoryStore, StoreError> {
        let table = canonicalize_collection(collection)?;
        let conn = self.connect()?;
        schema::install_history(&conn, &table)?;
        Ok(SqliteHistoryStore::new(conn, table))
    }

    /// History handle under the `"<current>.versions"` naming convention.
    pub fn history_for(&self, current_collection: &str) -> Result<SqliteHistoryStore, StoreError> {
        self.history(&history_collection_name(current_collection))
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(self.options.busy_timeout)?;
        Ok(conn)
    }
}

fn canonicalize_collection(value: &str) -> Result<String, StoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::InvalidInput("collection name must not be empty"));
    }
    if value.len() > MAX_COLLECTION_NAME_LEN {
        return Err(StoreError::InvalidInput("collection name is too long"));
    }
    if value.starts_with("sqlite_") {
        return Err(StoreError::InvalidInput("collection name uses a reserved prefix"));
    }
    let valid = value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.'));
    if !valid || !value.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
        return Err(StoreError::InvalidInput("invalid collection name"));
    }
    Ok(value.to_string())
}

fn to_sqlite_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn from_sqlite_version(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or(StoreError::InvalidInput("stored version must be positive"))
}

fn opt_to_sqlite_i64(value: Option<u64>) -> Result<Option<i64>, StoreError> {
    value.map(to_sqlite_i64).transpose()
}

/// Raw column values shared by both tables.
struct RowParts {
    id: String,
    version: Option<i64>,
    based_on_version: Option<i64>,
    payload_json: String,
    updated_at_ms: i64,
}

impl RowParts {
    fn into_record(self) -> Result<VersionedRecord, StoreError> {
        let id = DocumentId::try_new(self.id)
            .map_err(|_| StoreError::InvalidInput("invalid document id row"))?;
        let version = match self.version {
            Some(v) => from_sqlite_version(v)?,
            None => 1,
        };
        let based_on_version = self.based_on_version.map(from_sqlite_version).transpose()?;
        let payload: Payload = serde_json::from_str(&self.payload_json)?;
        Ok(VersionedRecord {
            id,
            version: Some(version),
            based_on_version,
            payload,
            updated_at_ms: self.updated_at_ms,
        })
    }
}
