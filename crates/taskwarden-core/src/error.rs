//! Core error types for taskwarden-core.
//!
//! This module defines the error hierarchy using thiserror. Per-evaluation
//! code paths never panic; unrecoverable conditions (corrupt configuration)
//! surface at load time as `ConfigError`.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for taskwarden-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Trigger/delegation store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Live-context fetch errors
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Notification delivery errors
    #[error("Notifier error for '{channel}': {message}")]
    Notifier { channel: String, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Trigger/delegation store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Store migration failed: {0}")]
    MigrationFailed(String),

    /// Unknown trigger id
    #[error("Unknown trigger: {0}")]
    UnknownTrigger(String),

    /// Store is temporarily unavailable (retried with backoff by callers)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Live-context (calendar / work-item) fetch errors.
///
/// These never propagate past the mismatch detector: any variant collapses
/// into the `UnknownContext` conservative path.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Upstream did not answer within the configured timeout
    #[error("Context fetch timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Upstream returned an error
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Referenced work item no longer exists upstream
    #[error("Work item not found: {0}")]
    ItemNotFound(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Inbound event payload is missing a required field
    #[error("Malformed payload: missing required field '{0}'")]
    MissingField(&'static str),

    /// Inbound event payload carries an unrecognized value
    #[error("Malformed payload: invalid value for '{field}': {message}")]
    InvalidField { field: &'static str, message: String },

    /// Unrecognized event kind for the given source
    #[error("Unsupported event kind '{kind}' for source '{event_source}'")]
    UnsupportedEvent { event_source: String, kind: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Unavailable("database is locked".into())
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
