//! Error types for TIERLINE operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Cache tier storage errors.
///
/// These never reach a `read_through` caller: the orchestrator treats them as
/// a miss on the failing tier. They do surface from maintenance operations
/// such as invalidation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Durable medium failed during {operation}: {reason}")]
    Medium { operation: String, reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization failed for {key}: {reason}")]
    Deserialization { key: String, reason: String },
}

impl StoreError {
    /// Shorthand for a medium failure during the named operation.
    pub fn medium(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Medium {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// A fetch function failed before producing a response (timeout, connection
/// reset, DNS failure). Transport errors are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A logical failure reported by the remote side (not found, forbidden, 5xx
/// with a body). Application errors are deterministic and never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{}", self.describe())]
pub struct ApplicationError {
    /// Remote status code, when the remote speaks HTTP-ish.
    pub status: Option<u16>,
    /// Remote error code, when one is provided.
    pub code: Option<String>,
    pub message: String,
}

impl ApplicationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn describe(&self) -> String {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => format!("[{} {}] {}", status, code, self.message),
            (Some(status), None) => format!("[{}] {}", status, self.message),
            (None, Some(code)) => format!("[{}] {}", code, self.message),
            (None, None) => self.message.clone(),
        }
    }
}

/// Failures a `read_through` caller can observe.
///
/// The three variants carry different meanings for the layer above: no data
/// because the network is down, no data because the remote said no, and no
/// data because the remote could not be reached after retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadThroughError {
    #[error("Network unavailable, no cached data for {key}")]
    NetworkUnavailable { key: String },

    #[error("Fetch for {key} failed after {attempts} attempts: {last_error}")]
    Transport {
        key: String,
        attempts: u32,
        last_error: TransportError,
    },

    #[error("Remote rejected {key}: {error}")]
    Application { key: String, error: ApplicationError },
}

impl ReadThroughError {
    /// True when the failure is caused by the device being offline.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::NetworkUnavailable { .. })
    }

    /// True when a later attempt might succeed without any change on the remote.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable { .. } | Self::Transport { .. })
    }

    /// The logical key the failing read was for.
    pub fn key(&self) -> &str {
        match self {
            Self::NetworkUnavailable { key }
            | Self::Transport { key, .. }
            | Self::Application { key, .. } => key,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Annotation attached to data served past its TTL because the network was
/// unavailable. Not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleDataWarning {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub age: Duration,
}

impl fmt::Display for StaleDataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Serving cached {} from {} ({}s old): network unavailable",
            self.key,
            self.stored_at.to_rfc3339(),
            self.age.as_secs()
        )
    }
}

/// Master error type for all TIERLINE errors.
#[derive(Debug, Clone, Error)]
pub enum TierlineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Read error: {0}")]
    ReadThrough(#[from] ReadThroughError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for TIERLINE operations.
pub type TierlineResult<T> = Result<T, TierlineError>;

// =============================================================================
// TESTS
// =============================================================================
