#![forbid(unsafe_code)]

use crate::clock::{Clock, SystemClock};
use crate::error::{RevisionError, StoreError};
use crate::hooks::ReviseHook;
use crate::reader::HistoryReader;
use crate::retention::{PruneReport, prune};
use crate::store::{CurrentStore, HistoryStore};
use docrev_core::backoff::{jitter_seed, next_backoff};
use docrev_core::{DocumentId, VersionedRecord, VersioningConfig};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviseOutcome {
    pub version: u64,
    pub based_on_version: Option<u64>,
    /// Compare-and-swap attempts, including the successful one. Zero for a first insert.
    pub attempts: u32,
    /// Whether this call wrote the previous snapshot to history itself.
    pub archived: bool,
    pub pruned: PruneReport,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Inserted,
    AlreadyArchived,
}

/// Moves documents from version N to N+1, archiving N, with optimistic concurrency.
///
/// The engine holds no lock of its own: concurrent writers, in this process or others, are
/// serialised solely by the current store's compare-and-swap on the version column.
pub struct RevisionEngine<C, H> {
    current: C,
    history: H,
    config: VersioningConfig,
    hooks: Vec<Box<dyn ReviseHook + Send>>,
    clock: Box<dyn Clock + Send>,
}

impl<C, H> std::fmt::Debug for RevisionEngine<C, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionEngine")
            .field("config", &self.config)
            .field(
                "hooks",
                &self.hooks.iter().map(|hook| hook.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<C: CurrentStore, H: HistoryStore> RevisionEngine<C, H> {
    pub fn new(current: C, history: H) -> Self {
        Self {
            current,
            history,
            config: VersioningConfig::default(),
            hooks: Vec::new(),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_config(mut self, config: VersioningConfig) -> Result<Self, RevisionError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_hook(mut self, hook: impl ReviseHook + Send + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &VersioningConfig {
        &self.config
    }

    pub fn current_store(&self) -> &C {
        &self.current
    }

    pub fn history_store(&self) -> &H {
        &self.history
    }

    pub fn history(&self) -> HistoryReader<'_, C, H> {
        HistoryReader::new(&self.current, &self.history)
    }

    /// Persists `record` as the next version of its document.
    ///
    /// An unpersisted record (no version) is inserted as version 1 with nothing archived.
    /// Otherwise the current row is archived and replaced under a version guard, re-reading
    /// and retrying whenever another writer lands first. On success `record` carries the
    /// assigned version and lineage.
    pub fn revise(&self, record: &mut VersionedRecord) -> Result<ReviseOutcome, RevisionError> {
        self.run_before_hooks(record)?;

        let outcome = match record.version {
            None => self.create(record)?,
            Some(_) => self.revise_existing(record)?,
        };

        for hook in &self.hooks {
            hook.after_revise(record);
        }
        Ok(outcome)
    }

    /// Writes `snapshot` to history unless `(id, version)` is already there.
    ///
    /// A concurrent writer archiving the same key first is not an error.
    pub fn archive(&self, snapshot: &VersionedRecord) -> Result<ArchiveOutcome, StoreError> {
        let Some(key) = snapshot.archive_key() else {
            return Err(StoreError::InvalidInput(
                "archived snapshot must carry a version",
            ));
        };

        if self.history.exists_archived(&key.original_id, key.version)? {
            return Ok(ArchiveOutcome::AlreadyArchived);
        }

        match self.history.insert_archived(snapshot) {
            Ok(()) => Ok(ArchiveOutcome::Inserted),
            Err(StoreError::DuplicateKey) => {
                tracing::debug!(%key, "archive raced with another writer");
                Ok(ArchiveOutcome::AlreadyArchived)
            }
            Err(err) => Err(err),
        }
    }

    /// Applies the configured retention policy to `id` on demand.
    pub fn prune(&self, id: &DocumentId) -> Result<PruneReport, RevisionError> {
        let current = self
            .current
            .get(id)?
            .ok_or_else(|| RevisionError::NotFound { id: id.clone() })?;
        let current_version = current.version.unwrap_or(1);
        Ok(self.prune_after(id, current_version))
    }

    fn run_before_hooks(&self, record: &VersionedRecord) -> Result<(), RevisionError> {
        for hook in &self.hooks {
            if let Err(rejection) = hook.before_revise(record) {
                tracing::debug!(id = %record.id, hook = hook.name(), reason = %rejection.reason, "revise rejected");
                return Err(RevisionError::Validation {
                    hook: hook.name().to_string(),
                    reason: rejection.reason,
                });
            }
        }
        Ok(())
    }

    fn create(&self, record: &mut VersionedRecord) -> Result<ReviseOutcome, RevisionError> {
        let candidate = VersionedRecord {
            id: record.id.clone(),
            version: Some(1),
            based_on_version: None,
            payload: record.payload.clone(),
            updated_at_ms: self.clock.now_ms(),
        };
        self.current.insert(&candidate)?;
        tracing::info!(id = %candidate.id, version = 1, "created document");

        let pruned = self.prune_after(&candidate.id, 1);
        *record = candidate;
        Ok(ReviseOutcome {
            version: 1,
            based_on_version: None,
            attempts: 0,
            archived: false,
            pruned,
        })
    }

    fn revise_existing(&self, record: &mut VersionedRecord) -> Result<ReviseOutcome, RevisionError> {
        let retry = &self.config.retry;
        let held_version = record.version;
        let mut attempt = 0u32;
        let mut backoff_ms = retry.initial_backoff_ms;

        loop {
            attempt = attempt.saturating_add(1);

            let current = self
                .current
                .get(&record.id)?
                .ok_or_else(|| RevisionError::NotFound {
                    id: record.id.clone(),
                })?;
            let observed = current.version.unwrap_or(1);
            tracing::debug!(id = %record.id, observed, attempt, "revise attempt");

            let archived = self.archive(&current)? == ArchiveOutcome::Inserted;

            let based_on = self.config.lineage.based_on(held_version, observed);
            let new_version = observed
                .checked_add(1)
                .ok_or(StoreError::InvalidInput("version counter overflow"))?;
            let candidate = VersionedRecord {
                id: record.id.clone(),
                version: Some(new_version),
                based_on_version: Some(based_on),
                payload: record.payload.clone(),
                updated_at_ms: self.clock.now_ms(),
            };

            match self
                .current
                .compare_and_swap(&record.id, observed, &candidate)?
            {
                1 => {
                    tracing::info!(
                        id = %candidate.id,
                        version = new_version,
                        based_on_version = based_on,
                        attempts = attempt,
                        "revised document"
                    );
                    let pruned = self.prune_after(&candidate.id, new_version);
                    *record = candidate;
                    return Ok(ReviseOutcome {
                        version: new_version,
                        based_on_version: Some(based_on),
                        attempts: attempt,
                        archived,
                        pruned,
                    });
                }
                0 => {
                    tracing::warn!(id = %record.id, expected = observed, attempt, "version guard mismatch, retrying");
                    if attempt >= retry.max_attempts {
                        self.prune_latest(&record.id);
                        return Err(RevisionError::ConflictExhausted {
                            id: record.id.clone(),
                            attempts: attempt,
                        });
                    }
                    let step = next_backoff(backoff_ms, retry.max_backoff_ms, jitter_seed());
                    if step.sleep_ms > 0 {
                        std::thread::sleep(Duration::from_millis(step.sleep_ms));
                    }
                    backoff_ms = step.next_backoff_ms;
                }
                _ => {
                    return Err(RevisionError::Store(StoreError::InvalidInput(
                        "compare-and-swap matched more than one row",
                    )));
                }
            }
        }
    }

    /// A failed cycle may have re-archived a snapshot a competitor already pruned.
    fn prune_latest(&self, id: &DocumentId) {
        if self.config.retention.is_unbounded() {
            return;
        }
        match self.current.get(id) {
            Ok(Some(latest)) => {
                self.prune_after(id, latest.version.unwrap_or(1));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(id = %id, error = %err, "skipping retention after exhausted retries");
            }
        }
    }

    fn prune_after(&self, id: &DocumentId, current_version: u64) -> PruneReport {
        prune(
            &self.history,
            &self.config.retention,
            id,
            current_version,
            self.clock.now_ms(),
        )
    }
}
