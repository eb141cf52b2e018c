#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

const MAX_DOCUMENT_ID_LEN: usize = 128;

/// Stable identifier of a logical document, shared by every one of its versions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, DocumentIdError> {
        let value = value.into();
        validate_document_id(&value)?;
        Ok(Self(value))
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = DocumentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentIdError {
    Empty,
    TooLong,
    InvalidFirstChar,
    InvalidChar { ch: char, index: usize },
}

impl DocumentIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "document id must not be empty",
            Self::TooLong => "document id is too long",
            Self::InvalidFirstChar => "document id must start with an ASCII letter or digit",
            Self::InvalidChar { .. } => "document id contains an invalid character",
        }
    }
}

impl std::fmt::Display for DocumentIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidChar { ch, index } => {
                write!(f, "{} ({ch:?} at {index})", self.message())
            }
            other => f.write_str(other.message()),
        }
    }
}

impl std::error::Error for DocumentIdError {}

fn validate_document_id(value: &str) -> Result<(), DocumentIdError> {
    if value.is_empty() {
        return Err(DocumentIdError::Empty);
    }
    if value.len() > MAX_DOCUMENT_ID_LEN {
        return Err(DocumentIdError::TooLong);
    }
    let Some(first) = value.chars().next() else {
        return Err(DocumentIdError::Empty);
    };
    if !first.is_ascii_alphanumeric() {
        return Err(DocumentIdError::InvalidFirstChar);
    }
    for (index, ch) in value.chars().enumerate().skip(1) {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-' | ':') {
            continue;
        }
        return Err(DocumentIdError::InvalidChar { ch, index });
    }
    Ok(())
}
