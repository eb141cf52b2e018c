#![forbid(unsafe_code)]

use docrev_core::VersionedRecord;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookRejection {
    pub reason: String,
}

impl HookRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Extension points around a single `revise` call.
///
/// Hooks run in registration order, once per call, never per retry.
pub trait ReviseHook {
    fn name(&self) -> &str;

    /// Returning an error aborts the revise before either store is touched.
    fn before_revise(&self, _record: &VersionedRecord) -> Result<(), HookRejection> {
        Ok(())
    }

    fn after_revise(&self, _record: &VersionedRecord) {}
}

/// Rejects records whose payload lacks a value for any of the listed keys.
///
/// `null` and the empty string count as missing.
#[derive(Clone, Debug)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl ReviseHook for RequiredFields {
    fn name(&self) -> &str {
        "required_fields"
    }

    fn before_revise(&self, record: &VersionedRecord) -> Result<(), HookRejection> {
        for field in &self.fields {
            let present = match record.get(field) {
                None | Some(Value::Null) => false,
                Some(Value::String(text)) => !text.trim().is_empty(),
                Some(_) => true,
            };
            if !present {
                return Err(HookRejection::new(format!("{field} must be present")));
            }
        }
        Ok(())
    }
}
