#![forbid(unsafe_code)]

use crate::error::RevisionError;
use crate::store::{CurrentStore, HistoryStore, VersionFilter, VersionOrder};
use docrev_core::{DocumentId, VersionedRecord};

/// Read-side view over a document's version chain.
///
/// Every sequence returned is materialised when the call is made, so a concurrent
/// retention pass cannot remove rows from under an iteration.
#[derive(Debug)]
pub struct HistoryReader<'a, C: ?Sized, H: ?Sized> {
    current: &'a C,
    history: &'a H,
}

impl<C: ?Sized, H: ?Sized> Clone for HistoryReader<'_, C, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: ?Sized, H: ?Sized> Copy for HistoryReader<'_, C, H> {}

impl<'a, C, H> HistoryReader<'a, C, H>
where
    C: CurrentStore + ?Sized,
    H: HistoryStore + ?Sized,
{
    pub fn new(current: &'a C, history: &'a H) -> Self {
        Self { current, history }
    }

    pub fn latest_version(&self, id: &DocumentId) -> Result<VersionedRecord, RevisionError> {
        self.current
            .get(id)?
            .ok_or_else(|| RevisionError::NotFound { id: id.clone() })
    }

    /// Archived versions, newest first, never including the current one.
    pub fn previous_versions(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<VersionedRecord>, RevisionError> {
        let latest = self.latest_version(id)?;
        self.previous_versions_of(&latest)
    }

    /// The current row followed by every archived version, newest first.
    pub fn all_versions(&self, id: &DocumentId) -> Result<Vec<VersionedRecord>, RevisionError> {
        let latest = self.latest_version(id)?;
        let previous = self.previous_versions_of(&latest)?;

        let mut out = Vec::with_capacity(previous.len() + 1);
        out.push(latest);
        out.extend(previous);
        Ok(out)
    }

    /// `Ok(None)` when no such version exists, in either store.
    pub fn version(
        &self,
        id: &DocumentId,
        version: u64,
    ) -> Result<Option<VersionedRecord>, RevisionError> {
        if version == 0 {
            return Ok(None);
        }

        if let Some(latest) = self.current.get(id)? {
            if latest.version == Some(version) {
                return Ok(Some(latest));
            }
            if latest.version.is_some_and(|current| version > current) {
                return Ok(None);
            }
        }

        let mut rows =
            self.history
                .find_archived(id, VersionFilter::Exactly(version), VersionOrder::Descending)?;
        Ok(rows.pop())
    }

    fn previous_versions_of(
        &self,
        latest: &VersionedRecord,
    ) -> Result<Vec<VersionedRecord>, RevisionError> {
        let filter = match latest.version {
            Some(version) => VersionFilter::Except(version),
            None => VersionFilter::All,
        };
        Ok(self
            .history
            .find_archived(&latest.id, filter, VersionOrder::Descending)?)
    }
}
