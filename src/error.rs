//! Unified error types for the device fleet

use serde::Serialize;
use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Stable classification of an [`Error`], suitable for structured results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ResourceExhausted,
    ToolInvocationFailed,
    Connection,
    ConnectionRemoved,
    Timeout,
    Cancelled,
    NotFound,
    InvalidState,
    Configuration,
    Internal,
}

/// Unified error type for the device fleet
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No free port, instance slot or session slot
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// External device-control tool call failed or timed out
    #[error("Tool invocation failed: {0}")]
    ToolInvocationFailed(String),

    /// Transient attach/probe/dispatch failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Reconnection retries exhausted, the record was purged
    #[error("Connection removed: {0}")]
    ConnectionRemoved(String),

    /// Timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Operation abandoned because its owner was stopped or ended
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new resource exhausted error
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        Error::ResourceExhausted(msg.into())
    }

    /// Create a new tool invocation error
    pub fn tool<S: Into<String>>(msg: S) -> Self {
        Error::ToolInvocationFailed(msg.into())
    }

    /// Create a new transient connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::Connection(msg.into())
    }

    /// Create a new connection removed error
    pub fn connection_removed<S: Into<String>>(device_id: S) -> Self {
        Error::ConnectionRemoved(device_id.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new cancelled error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Error::Cancelled(msg.into())
    }

    /// Create a new device not found error
    pub fn device_not_found<S: Into<String>>(id: S) -> Self {
        Error::DeviceNotFound(id.into())
    }

    /// Create a new session not found error
    pub fn session_not_found<S: Into<String>>(id: S) -> Self {
        Error::SessionNotFound(id.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Error::ToolInvocationFailed(_) | Error::Io(_) => ErrorKind::ToolInvocationFailed,
            Error::Connection(_) => ErrorKind::Connection,
            Error::ConnectionRemoved(_) => ErrorKind::ConnectionRemoved,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::DeviceNotFound(_) | Error::SessionNotFound(_) => ErrorKind::NotFound,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Serialization(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the fault is recovered locally by the reconnection state machine
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(_))
    }
}
