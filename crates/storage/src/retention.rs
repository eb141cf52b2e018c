#![forbid(unsafe_code)]

use crate::store::{HistoryStore, VersionFilter, VersionOrder};
use docrev_core::retention::{ArchivedVersion, surplus_versions};
use docrev_core::{DocumentId, RetentionPolicy};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<u64>,
    pub failed: Vec<u64>,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.failed.is_empty()
    }
}

/// Deletes surplus history for `id` under `policy`. Never touches the current store.
///
/// Failures are logged and recorded in the report; they never abort the pass.
pub fn prune<H: HistoryStore + ?Sized>(
    history: &H,
    policy: &RetentionPolicy,
    id: &DocumentId,
    current_version: u64,
    now_ms: i64,
) -> PruneReport {
    let mut report = PruneReport::default();
    if policy.is_unbounded() {
        return report;
    }

    let archived = match history.find_archived(id, VersionFilter::All, VersionOrder::Descending) {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(%id, error = %err, "retention: could not list archived versions");
            return report;
        }
    };
    let archived: Vec<ArchivedVersion> = archived
        .iter()
        .filter_map(|row| {
            row.version.map(|version| ArchivedVersion {
                version,
                updated_at_ms: row.updated_at_ms,
            })
        })
        .collect();

    for version in surplus_versions(policy, current_version, &archived, now_ms) {
        match history.delete_archived(id, version) {
            Ok(_) => report.deleted.push(version),
            Err(err) => {
                tracing::warn!(%id, version, error = %err, "retention: failed to delete archived version");
                report.failed.push(version);
            }
        }
    }

    if !report.is_empty() {
        tracing::info!(
            %id,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "retention pass pruned history"
        );
    }
    report
}
