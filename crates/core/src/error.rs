//! Unified error types for the bridge.
//!
//! Fatal errors carry a process exit code:
//! - 1: configuration could not be loaded
//! - 2: the storage connection could not be opened
//! - 3: the MQTT transport failed unrecoverably
//!
//! Transport failures reach the pipeline as bus events, not as [`Error`]
//! values. An [`Error`] raised while handling a message drops that message
//! and the pipeline carries on with the next one.

use thiserror::Error;

use crate::topic::ValueType;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Exit codes for errors that terminate the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalErrorCode {
    /// Configuration file or topic configuration is invalid
    Config,
    /// Initial storage connection failed
    StorageOpen,
    /// MQTT connection refused or broken
    Transport,
}

impl FatalErrorCode {
    /// Get the process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config => 1,
            Self::StorageOpen => 2,
            Self::Transport => 3,
        }
    }
}

/// Unified error type for the bridge.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("payload is not valid UTF-8")]
    PayloadEncoding,

    #[error("query {query} did not match a value")]
    QueryMiss { query: String },

    #[error("query {query} matched {found} values, expected one")]
    QueryAmbiguous { query: String, found: usize },

    #[error("query {query} matched a non-scalar value")]
    NotScalar { query: String },

    #[error("cannot coerce {value} to {value_type}")]
    Coercion { value: String, value_type: ValueType },

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn coercion(value: impl Into<String>, value_type: ValueType) -> Self {
        Self::Coercion {
            value: value.into(),
            value_type,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// Process-level error signal.
///
/// An `exit_code` of zero is advisory; anything else asks the process to
/// terminate with that code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub message: String,
    pub exit_code: i32,
}

impl ErrorEvent {
    pub fn advisory(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: 0,
        }
    }

    pub fn fatal(code: FatalErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: code.exit_code(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.exit_code != 0
    }
}
