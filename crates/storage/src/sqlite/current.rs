#![forbid(unsafe_code)]

use super::{RowParts, opt_to_sqlite_i64, to_sqlite_i64};
use crate::error::{StoreError, map_insert_conflict};
use crate::store::CurrentStore;
use docrev_core::{DocumentId, VersionedRecord};
use rusqlite::{Connection, OptionalExtension, params};

#[derive(Debug)]
pub struct SqliteCurrentStore {
    conn: Connection,
    table: String,
}

impl SqliteCurrentStore {
    pub(super) fn new(conn: Connection, table: String) -> Self {
        Self { conn, table }
    }

    pub fn collection(&self) -> &str {
        &self.table
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count = self.conn.query_row(
            &format!(r#"SELECT COUNT(1) FROM "{}""#, self.table),
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl CurrentStore for SqliteCurrentStore {
    fn get(&self, id: &DocumentId) -> Result<Option<VersionedRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    r#"SELECT id, version, based_on_version, payload_json, updated_at_ms
                       FROM "{}" WHERE id = ?1"#,
                    self.table
                ),
                params![id.as_str()],
                |row| {
                    Ok(RowParts {
                        id: row.get(0)?,
                        version: row.get(1)?,
                        based_on_version: row.get(2)?,
                        payload_json: row.get(3)?,
                        updated_at_ms: row.get(4)?,
                    })
                },
            )
            .optional()?;

        row.map(RowParts::into_record).transpose()
    }

    fn compare_and_swap(
        &self,
        id: &DocumentId,
        expected_version: u64,
        record: &VersionedRecord,
    ) -> Result<usize, StoreError> {
        let Some(new_version) = record.version else {
            return Err(StoreError::InvalidInput(
                "compare-and-swap requires a versioned record",
            ));
        };
        let payload_json = serde_json::to_string(&record.payload)?;

        let matched = self.conn.execute(
            &format!(
                r#"UPDATE "{}"
                   SET version = ?3,
                       based_on_version = ?4,
                       payload_json = ?5,
                       updated_at_ms = ?6
                   WHERE id = ?1 AND COALESCE(version, 1) = ?2"#,
                self.table
            ),
            params![
                id.as_str(),
                to_sqlite_i64(expected_version)?,
                to_sqlite_i64(new_version)?,
                opt_to_sqlite_i64(record.based_on_version)?,
                payload_json,
                record.updated_at_ms,
            ],
        )?;
        Ok(matched)
    }

    fn insert(&self, record: &VersionedRecord) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(&record.payload)?;

        self.conn
            .execute(
                &format!(
                    r#"INSERT INTO "{}"(id, version, based_on_version, payload_json, updated_at_ms)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    self.table
                ),
                params![
                    record.id.as_str(),
                    opt_to_sqlite_i64(record.version)?,
                    opt_to_sqlite_i64(record.based_on_version)?,
                    payload_json,
                    record.updated_at_ms,
                ],
            )
            .map_err(map_insert_conflict)?;
        Ok(())
    }
}
