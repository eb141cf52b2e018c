#![forbid(unsafe_code)]

use crate::config::RetentionPolicy;

/// An archived version as seen by the pruning pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchivedVersion {
    pub version: u64,
    pub updated_at_ms: i64,
}

/// Versions that should be removed from history, oldest first.
///
/// The current row counts towards `max_versions` but is never returned. With a hold time,
/// only snapshots last modified strictly before `now_ms - min_hold_time_ms` qualify.
pub fn surplus_versions(
    policy: &RetentionPolicy,
    current_version: u64,
    archived: &[ArchivedVersion],
    now_ms: i64,
) -> Vec<u64> {
    let Some(max_versions) = policy.max_versions else {
        return Vec::new();
    };
    let max_versions = usize::try_from(max_versions).unwrap_or(usize::MAX).max(1);

    let mut candidates: Vec<ArchivedVersion> = archived
        .iter()
        .copied()
        .filter(|entry| entry.version != current_version)
        .collect();
    candidates.sort_by(|a, b| b.version.cmp(&a.version));
    candidates.dedup_by_key(|entry| entry.version);

    let total = candidates.len().saturating_add(1);
    if total <= max_versions {
        return Vec::new();
    }

    // The current row occupies one of the kept slots.
    let keep_archived = max_versions - 1;
    let cutoff_ms = policy
        .min_hold_time_ms
        .map(|hold| now_ms.saturating_sub(i64::try_from(hold).unwrap_or(i64::MAX)));

    let mut surplus: Vec<u64> = candidates
        .into_iter()
        .skip(keep_archived)
        .filter(|entry| cutoff_ms.is_none_or(|cutoff| entry.updated_at_ms < cutoff))
        .map(|entry| entry.version)
        .collect();
    surplus.reverse();
    surplus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archived(versions: &[(u64, i64)]) -> Vec<ArchivedVersion> {
        versions
            .iter()
            .map(|&(version, updated_at_ms)| ArchivedVersion {
                version,
                updated_at_ms,
            })
            .collect()
    }

    #[test]
    fn unbounded_policy_never_prunes() {
        let rows = archived(&[(1, 0), (2, 0), (3, 0)]);
        assert!(surplus_versions(&RetentionPolicy::keep_all(), 4, &rows, 1_000).is_empty());
    }

    #[test]
    fn under_threshold_keeps_everything() {
        let rows = archived(&[(1, 0), (2, 0)]);
        assert!(surplus_versions(&RetentionPolicy::max_versions(3), 3, &rows, 1_000).is_empty());
    }

    #[test]
    fn prunes_oldest_beyond_threshold() {
        let rows = archived(&[(3, 0), (1, 0), (4, 0), (2, 0)]);
        let surplus = surplus_versions(&RetentionPolicy::max_versions(2), 5, &rows, 1_000);
        assert_eq!(surplus, vec![1, 2, 3]);
    }

    #[test]
    fn single_version_budget_prunes_all_history() {
        let rows = archived(&[(1, 0), (2, 0)]);
        let surplus = surplus_versions(&RetentionPolicy::max_versions(1), 3, &rows, 1_000);
        assert_eq!(surplus, vec![1, 2]);
    }

    #[test]
    fn hold_time_protects_recent_snapshots() {
        let rows = archived(&[(1, 100), (2, 900), (3, 950)]);
        let policy = RetentionPolicy::max_versions(1).with_min_hold_time_ms(500);
        let surplus = surplus_versions(&policy, 4, &rows, 1_000);
        assert_eq!(surplus, vec![1]);
    }

    #[test]
    fn current_version_in_history_is_ignored() {
        let rows = archived(&[(1, 0), (2, 0), (3, 0)]);
        let surplus = surplus_versions(&RetentionPolicy::max_versions(2), 3, &rows, 1_000);
        assert_eq!(surplus, vec![1]);
    }
}
