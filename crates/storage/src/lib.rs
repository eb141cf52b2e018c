#![forbid(unsafe_code)]

//! Optimistic-concurrency revisioning over a current/history pair of document collections.
//!
//! [`RevisionEngine::revise`] archives the stored version of a document and advances the
//! current row to the next version under a compare-and-swap guard, retrying when another
//! writer wins. [`HistoryReader`] reconstructs the version chain and [`prune`] bounds it.

mod clock;
mod engine;
mod error;
mod hooks;
mod reader;
mod retention;
mod sqlite;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{ArchiveOutcome, ReviseOutcome, RevisionEngine};
pub use error::{RevisionError, StoreError};
pub use hooks::{HookRejection, RequiredFields, ReviseHook};
pub use reader::HistoryReader;
pub use retention::{PruneReport, prune};
pub use sqlite::{SqliteCurrentStore, SqliteHistoryStore, SqliteStore, StoreOptions};
pub use store::{CurrentStore, HistoryStore, VersionFilter, VersionOrder};

pub use docrev_core::{
    DocumentId, LineagePolicy, Payload, RetentionPolicy, RetryPolicy, VersionedRecord,
    VersioningConfig,
};
