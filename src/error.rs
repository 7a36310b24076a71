//! Custom error types for key-presser.
//!
//! Only hotkey registration failures are ever shown to the user. Injection
//! problems are logged and healed on the next command, so most variants here
//! surface from configuration loading and helper start-up.

use std::io;
use thiserror::Error;

/// Main error type for key-presser operations.
#[derive(Error, Debug)]
pub enum MacroError {
    /// None of the candidate chords for the start/stop shortcut could be bound.
    #[error("could not register shortcut '{shortcut}': {reason}")]
    Registration { shortcut: String, reason: String },

    /// The specified key is invalid or unsupported.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Configuration validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// Error reading or parsing configuration file.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error parsing duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// The injection helper process could not be started.
    #[error("failed to start injection helper '{program}': {reason}")]
    HelperSpawn { program: String, reason: String },

    /// The injection helper is not running or its input stream is closed.
    #[error("injection helper unavailable: {0}")]
    HelperUnavailable(String),

    /// The engine's event loop has ended.
    #[error("macro engine is no longer running")]
    EngineClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for key-presser operations.
pub type Result<T> = std::result::Result<T, MacroError>;

impl MacroError {
    /// Create a new Registration error.
    pub fn registration(shortcut: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Registration {
            shortcut: shortcut.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidKey error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidDuration error.
    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new HelperSpawn error.
    pub fn helper_spawn(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HelperSpawn {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create a new HelperUnavailable error.
    pub fn helper_unavailable(message: impl Into<String>) -> Self {
        Self::HelperUnavailable(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MacroError::registration("F1", "hotkey already registered");
        assert_eq!(
            err.to_string(),
            "could not register shortcut 'F1': hotkey already registered"
        );

        let err = MacroError::invalid_key("xyz", "unknown key");
        assert_eq!(err.to_string(), "invalid key 'xyz': unknown key");

        let err = MacroError::config_validation("interval must be positive");
        assert_eq!(
            err.to_string(),
            "configuration error: interval must be positive"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: MacroError = io_err.into();
        assert!(matches!(err, MacroError::Io(_)));
    }
}
