//! Error types of the persistence/sync layer and the public result envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of the local key-value store.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// The write would exceed the backend's capacity.
    #[error("storage quota exceeded writing '{key}' ({needed} bytes needed, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("failed to serialize '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// I/O or database failure of the backend.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for LocalStoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(format!("{err:#}"))
    }
}

/// Outcome of a public store operation: `{ success, data?, error? }`.
///
/// Public methods never propagate raw errors; they report them here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OperationResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }

    /// Failed operation that still carries data (e.g. in-memory state kept
    /// after a failed local write).
    pub fn partial(data: T, error: impl ToString) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.success
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// The same failure, re-typed; any data is dropped.
    pub fn failure<U>(self) -> OperationResult<U> {
        OperationResult {
            success: false,
            data: None,
            error: self.error,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}
