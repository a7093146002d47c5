//! Error types shared across the engine.

use thiserror::Error;

/// Errors reported by a storage area
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to (de)serialize stored value for '{key}': {message}")]
    Serialization { key: String, message: String },
}

/// Errors reported by the browser tab APIs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrowserError {
    #[error("Browser API call '{call}' failed: {message}")]
    Api { call: &'static str, message: String },
}

/// Rejections from validated settings setters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Unknown setting '{0}'")]
    UnknownKey(String),

    #[error("{key} must be a whole number, got {value}")]
    NotAnInteger { key: &'static str, value: String },

    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange { key: &'static str, min: i64, max: i64, value: i64 },

    #[error("{key} must be at least {min}, got {value}")]
    TooSmall { key: &'static str, min: i64, value: i64 },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures while importing a backup
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    #[error("Failed to parse backup JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Umbrella error for engine operations
#[derive(Error, Debug)]
pub enum WranglerError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

pub type Result<T, E = WranglerError> = std::result::Result<T, E>;
