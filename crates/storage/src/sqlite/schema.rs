#![forbid(unsafe_code)]

use crate::error::StoreError;
use rusqlite::Connection;

pub(super) fn install_current(conn: &Connection, table: &str) -> Result<(), StoreError> {
    // `version` stays nullable so rows written before versioning was enabled can be adopted.
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
          id TEXT PRIMARY KEY,
          version INTEGER CHECK(version IS NULL OR version > 0),
          based_on_version INTEGER,
          payload_json TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );
        "#
    ))?;
    Ok(())
}

pub(super) fn install_history(conn: &Connection, table: &str) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
          row_id INTEGER PRIMARY KEY AUTOINCREMENT,
          orig_id TEXT NOT NULL,
          version INTEGER NOT NULL CHECK(version > 0),
          based_on_version INTEGER,
          payload_json TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS "{table}.orig_id_version"
          ON "{table}"(orig_id, version);
        "#
    ))?;
    Ok(())
}
