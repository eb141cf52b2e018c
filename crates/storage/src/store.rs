#![forbid(unsafe_code)]

use crate::error::StoreError;
use docrev_core::{DocumentId, VersionedRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionFilter {
    All,
    Exactly(u64),
    Except(u64),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VersionOrder {
    #[default]
    Descending,
    Ascending,
}

/// The live collection: one authoritative row per document id.
pub trait CurrentStore {
    /// Rows without a stored version are reported as version 1.
    fn get(&self, id: &DocumentId) -> Result<Option<VersionedRecord>, StoreError>;

    /// Replaces the row for `id` with `record` only if its version still equals
    /// `expected_version`. Returns the number of rows matched (0 or 1).
    fn compare_and_swap(
        &self,
        id: &DocumentId,
        expected_version: u64,
        record: &VersionedRecord,
    ) -> Result<usize, StoreError>;

    /// Fails with [`StoreError::DuplicateKey`] if the id is taken.
    fn insert(&self, record: &VersionedRecord) -> Result<(), StoreError>;
}

/// Archived snapshots keyed by `(original id, version)`.
///
/// Records handed out carry the original document id in `id`.
pub trait HistoryStore {
    fn exists_archived(&self, id: &DocumentId, version: u64) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::DuplicateKey`] if `(id, version)` is already archived.
    fn insert_archived(&self, record: &VersionedRecord) -> Result<(), StoreError>;

    /// Materialised result set, never a live cursor.
    fn find_archived(
        &self,
        id: &DocumentId,
        filter: VersionFilter,
        order: VersionOrder,
    ) -> Result<Vec<VersionedRecord>, StoreError>;

    /// Returns `false` when nothing was archived under that key.
    fn delete_archived(&self, id: &DocumentId, version: u64) -> Result<bool, StoreError>;
}

impl<T: CurrentStore + ?Sized> CurrentStore for &T {
    fn get(&self, id: &DocumentId) -> Result<Option<VersionedRecord>, StoreError> {
        (**self).get(id)
    }

    fn compare_and_swap(
        &self,
        id: &DocumentId,
        expected_version: u64,
        record: &VersionedRecord,
    ) -> Result<usize, StoreError> {
        (**self).compare_and_swap(id, expected_version, record)
    }

    fn insert(&self, record: &VersionedRecord) -> Result<(), StoreError> {
        (**self).insert(record)
    }
}

impl<T: HistoryStore + ?Sized> HistoryStore for &T {
    fn exists_archived(&self, id: &DocumentId, version: u64) -> Result<bool, StoreError> {
        (**self).exists_archived(id, version)
    }

    fn insert_archived(&self, record: &VersionedRecord) -> Result<(), StoreError> {
        (**self).insert_archived(record)
    }

    fn find_archived(
        &self,
        id: &DocumentId,
        filter: VersionFilter,
        order: VersionOrder,
    ) -> Result<Vec<VersionedRecord>, StoreError> {
        (**self).find_archived(id, filter, order)
    }

    fn delete_archived(&self, id: &DocumentId, version: u64) -> Result<bool, StoreError> {
        (**self).delete_archived(id, version)
    }
}
