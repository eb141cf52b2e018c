#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 5;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 250;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersioningConfig {
    pub retry: RetryPolicy,
    pub retention: RetentionPolicy,
    pub lineage: LineagePolicy,
}

impl VersioningConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.retention.validate()?;
        Ok(())
    }
}

/// Bound on the compare-and-swap retry loop.
///
/// Attempt `n` (1-based) that loses the race sleeps for roughly
/// `initial_backoff_ms * 2^(n-1)` (capped, plus jitter) before re-reading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub fn no_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1"));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.max_backoff_ms must not be below retry.initial_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// History pruning thresholds. Both absent means history is kept forever.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionPolicy {
    pub max_versions: Option<u32>,
    pub min_hold_time_ms: Option<u64>,
}

impl RetentionPolicy {
    pub fn keep_all() -> Self {
        Self::default()
    }

    pub fn max_versions(max_versions: u32) -> Self {
        Self {
            max_versions: Some(max_versions),
            min_hold_time_ms: None,
        }
    }

    pub fn with_min_hold_time_ms(mut self, min_hold_time_ms: u64) -> Self {
        self.min_hold_time_ms = Some(min_hold_time_ms);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_versions.is_none()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_versions == Some(0) {
            return Err(ConfigError::Invalid(
                "retention.max_versions must be at least 1 (the current row always counts)",
            ));
        }
        Ok(())
    }
}

/// Which version a revision records as `based_on_version` when the caller revised a stale copy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineagePolicy {
    /// The version the caller's in-memory record carried before the call.
    #[default]
    OriginalRead,
    /// The version read from the current store in the cycle that won.
    LastObserved,
}

impl LineagePolicy {
    pub fn based_on(self, held_version: Option<u64>, observed_version: u64) -> u64 {
        match self {
            Self::OriginalRead => held_version.unwrap_or(observed_version),
            Self::LastObserved => observed_version,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "config parse: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
