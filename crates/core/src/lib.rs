#![forbid(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod ids;
pub mod record;
pub mod retention;

pub use config::{ConfigError, LineagePolicy, RetentionPolicy, RetryPolicy, VersioningConfig};
pub use ids::{DocumentId, DocumentIdError};
pub use record::{ArchiveKey, Payload, VersionedRecord};

/// Default history collection name for a current collection, `"<current>.versions"`.
pub fn history_collection_name(current: &str) -> String {
    [current, "versions"].join(".")
}
