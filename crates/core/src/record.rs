#![forbid(unsafe_code)]

use crate::ids::DocumentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-defined document content. The engine passes it through untouched.
pub type Payload = serde_json::Map<String, Value>;

/// One version of a logical document, as held by the caller or read back from a store.
///
/// `version` is `None` until the record has been persisted once. Records read from either
/// store always carry a version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub id: DocumentId,
    pub version: Option<u64>,
    pub based_on_version: Option<u64>,
    pub payload: Payload,
    pub updated_at_ms: i64,
}

impl VersionedRecord {
    pub fn new(id: DocumentId, payload: Payload) -> Self {
        Self {
            id,
            version: None,
            based_on_version: None,
            payload,
            updated_at_ms: 0,
        }
    }

    pub fn with_generated_id(payload: Payload) -> Self {
        Self::new(DocumentId::generate(), payload)
    }

    pub fn is_persisted(&self) -> bool {
        self.version.is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.payload.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.payload.remove(key)
    }

    pub fn archive_key(&self) -> Option<ArchiveKey> {
        self.version.map(|version| ArchiveKey {
            original_id: self.id.clone(),
            version,
        })
    }
}

/// Unique key of an archived snapshot in the history store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveKey {
    pub original_id: DocumentId,
    pub version: u64,
}

impl std::fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.original_id, self.version)
    }
}
