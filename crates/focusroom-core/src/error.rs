//! Core error types for focusroom-core.
//!
//! The timer engine distinguishes three kinds of failure: bad input rejected
//! before any remote call (`ValidationError`), remote calls that failed or
//! timed out (`NetworkError` via the store seam), and actions invoked in a
//! state that does not allow them (`StateError`).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focusroom-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Input rejected before any remote call.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Action invoked in a state that does not permit it.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Remote call failed or timed out.
    #[error("Network error: {0}")]
    Network(String),

    /// Session store rejected or failed the request.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Whether the failure came from the network rather than the request.
    pub fn is_network(&self) -> bool {
        matches!(self, CoreError::Network(_))
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Network(_) | StoreError::Timeout => CoreError::Network(err.to_string()),
            other => CoreError::Store(other),
        }
    }
}

/// Validation errors for session parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Work phase must last at least one minute.
    #[error("work duration must be at least 1 minute, got {0}")]
    WorkDurationTooShort(u32),

    /// Duration exceeds the allowed maximum.
    #[error("{field} duration of {minutes} minutes exceeds the maximum of {max}")]
    DurationTooLong {
        field: &'static str,
        minutes: u32,
        max: u32,
    },
}

/// Errors for actions invoked in an invalid state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No session is active.
    #[error("no active session")]
    NoSession,

    /// A session is already active and replacement was not requested.
    #[error("session {0} is already active")]
    SessionActive(String),
}

/// Errors reported by a session store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store rejected the request payload.
    #[error("request rejected: {0}")]
    Validation(String),

    /// Transport failure.
    #[error("network failure: {0}")]
    Network(String),

    /// The request did not finish in time.
    #[error("request timed out")]
    Timeout,

    /// The referenced session does not exist.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The request conflicts with the store's state (e.g. another active session).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Local database failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown configuration key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created.
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_decode() {
            StoreError::Validation(format!("malformed response: {err}"))
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
