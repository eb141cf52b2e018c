#![forbid(unsafe_code)]

use super::{RowParts, opt_to_sqlite_i64, to_sqlite_i64};
use crate::error::{StoreError, map_insert_conflict};
use crate::store::{HistoryStore, VersionFilter, VersionOrder};
use docrev_core::{DocumentId, VersionedRecord};
use rusqlite::{Connection, OptionalExtension, params};

#[derive(Debug)]
pub struct SqliteHistoryStore {
    conn: Connection,
    table: String,
}

impl SqliteHistoryStore {
    pub(super) fn new(conn: Connection, table: String) -> Self {
        Self { conn, table }
    }

    pub fn collection(&self) -> &str {
        &self.table
    }

    pub fn count_archived(&self, id: &DocumentId) -> Result<u64, StoreError> {
        let count = self.conn.query_row(
            &format!(r#"SELECT COUNT(1) FROM "{}" WHERE orig_id = ?1"#, self.table),
            params![id.as_str()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn exists_archived(&self, id: &DocumentId, version: u64) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    r#"SELECT 1 FROM "{}" WHERE orig_id = ?1 AND version = ?2"#,
                    self.table
                ),
                params![id.as_str(), to_sqlite_i64(version)?],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some())
    }

    fn insert_archived(&self, record: &VersionedRecord) -> Result<(), StoreError> {
        let Some(version) = record.version else {
            return Err(StoreError::InvalidInput("archived snapshot must carry a version"));
        };
        let payload_json = serde_json::to_string(&record.payload)?;

        self.conn
            .execute(
                &format!(
                    r#"INSERT INTO "{}"(orig_id, version, based_on_version, payload_json, updated_at_ms)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    self.table
                ),
                params![
                    record.id.as_str(),
                    to_sqlite_i64(version)?,
                    opt_to_sqlite_i64(record.based_on_version)?,
                    payload_json,
                    record.updated_at_ms,
                ],
            )
            .map_err(map_insert_conflict)?;
        Ok(())
    }

    fn find_archived(
        &self,
        id: &DocumentId,
        filter: VersionFilter,
        order: VersionOrder,
    ) -> Result<Vec<VersionedRecord>, StoreError> {
        let (predicate, bound) = match filter {
            VersionFilter::All => ("", None),
            VersionFilter::Exactly(v) => (" AND version = ?2", Some(v)),
            VersionFilter::Except(v) => (" AND version <> ?2", Some(v)),
        };
        let direction = match order {
            VersionOrder::Descending => "DESC",
            VersionOrder::Ascending => "ASC",
        };

        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT orig_id, version, based_on_version, payload_json, updated_at_ms
               FROM "{}"
               WHERE orig_id = ?1{predicate}
               ORDER BY version {direction}"#,
            self.table
        ))?;

        let read_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RowParts> {
            Ok(RowParts {
                id: row.get(0)?,
                version: row.get(1)?,
                based_on_version: row.get(2)?,
                payload_json: row.get(3)?,
                updated_at_ms: row.get(4)?,
            })
        };
        let rows = match bound {
            Some(v) => stmt
                .query_map(params![id.as_str(), to_sqlite_i64(v)?], read_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![id.as_str()], read_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        // `orig_id` lands in `id`, so archived rows look exactly like current ones.
        rows.into_iter().map(RowParts::into_record).collect()
    }

    fn delete_archived(&self, id: &DocumentId, version: u64) -> Result<bool, StoreError> {
        let deleted = self.conn.execute(
            &format!(
                r#"DELETE FROM "{}" WHERE orig_id = ?1 AND version = ?2"#,
                self.table
            ),
            params![id.as_str(), to_sqlite_i64(version)?],
        )?;
        Ok(deleted > 0)
    }
}
