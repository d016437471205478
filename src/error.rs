//! Public error taxonomy. Internal helpers keep using `anyhow` (storage, config
//! parsing) the way the teacher does; at the repository/engine boundary those
//! failures are folded into this typed enum so callers can match on kind.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("storage error ({kind}) at {path}: {cause}")]
    Storage {
        kind: StorageErrorKind,
        path: PathBuf,
        #[source]
        cause: anyhow::Error,
    },

    #[error("data format error at {path}: {cause}")]
    DataFormat {
        path: PathBuf,
        #[source]
        cause: anyhow::Error,
    },

    #[error("layer '{layer}' failed: {message}")]
    Layer { layer: String, message: String },

    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("queue overflow: {pending} pending requests exceed max_pending={max_pending}")]
    QueueOverflow { pending: usize, max_pending: usize },

    #[error("engine not initialized")]
    NotInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Read,
    Write,
    LockTimeout,
    Decode,
}

impl std::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StorageErrorKind::Read => "read",
            StorageErrorKind::Write => "write",
            StorageErrorKind::LockTimeout => "lock_timeout",
            StorageErrorKind::Decode => "decode",
        };
        write!(f, "{s}")
    }
}

impl EngineError {
    #[must_use]
    pub fn storage(kind: StorageErrorKind, path: impl Into<PathBuf>, cause: anyhow::Error) -> Self {
        Self::Storage {
            kind,
            path: path.into(),
            cause,
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether the pipeline must abort the whole request on this error,
    /// versus a layer degrading in place (see spec.md §7 propagation policy).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Validation { .. } | EngineError::NotInitialized)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
