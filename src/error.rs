/// Unified error handling for mirador
///
/// Internals of the crate return these errors and propagate them with `?`.
/// The public operations of the session and the services convert them into
/// empty results (`false`, `None`, empty collections) at the boundary, so
/// callers in the presentation layer never see them directly.

use std::fmt;
use thiserror::Error;

/// Main error type for mirador operations
#[derive(Debug, Error)]
pub enum MiradorError {
    /// An operation needed an active session and none was present
    #[error("Not connected")]
    NotConnected,

    /// Errors raised by the store driver
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Profile store errors
    #[error("Profile store error: {0}")]
    Profile(#[from] ProfileError),
}

/// Errors reported by a store driver
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("connection closed")]
    Closed,

    #[error("{operation} is not supported: {message}")]
    Unsupported { operation: String, message: String },

    #[error("invalid reply: {message}")]
    Protocol { message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Profile store errors
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Result type alias for mirador operations
pub type MiradorResult<T> = Result<T, MiradorError>;

/// Result type alias for driver calls
pub type DriverResult<T> = Result<T, DriverError>;

impl MiradorError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MiradorError::NotConnected => ErrorSeverity::Info,
            MiradorError::Driver(DriverError::Unsupported { .. }) => ErrorSeverity::Info,
            MiradorError::Driver(DriverError::Timeout { .. }) => ErrorSeverity::Warning,
            MiradorError::Driver(DriverError::Connection { .. }) => ErrorSeverity::Warning,
            MiradorError::Driver(DriverError::Closed) => ErrorSeverity::Warning,
            MiradorError::Driver(_) => ErrorSeverity::Error,
            MiradorError::Config(_) => ErrorSeverity::Critical,
            MiradorError::Profile(_) => ErrorSeverity::Warning,
        }
    }

    /// Emit this error through `tracing` at the level matching its severity
    pub fn log(&self, operation: &str) {
        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::Error => {
                tracing::error!("{} failed: {}", operation, self)
            }
            ErrorSeverity::Warning => tracing::warn!("{} failed: {}", operation, self),
            ErrorSeverity::Info => tracing::debug!("{} skipped: {}", operation, self),
        }
    }
}

impl DriverError {
    pub fn connection<S: Into<String>>(message: S) -> Self {
        DriverError::Connection {
            message: message.into(),
        }
    }

    pub fn command<S: Into<String>>(command: S, message: S) -> Self {
        DriverError::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        DriverError::Timeout {
            operation: operation.into(),
        }
    }

    pub fn unsupported<S: Into<String>>(operation: S, message: S) -> Self {
        DriverError::Unsupported {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        DriverError::Protocol {
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for DriverError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            DriverError::timeout(err.to_string())
        } else if err.is_connection_dropped() || err.is_connection_refusal() {
            DriverError::connection(err.to_string())
        } else if err.is_io_error() {
            DriverError::connection(err.to_string())
        } else {
            let command = err.code().unwrap_or("command").to_string();
            DriverError::Command {
                command,
                message: err.to_string(),
            }
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about expected conditions
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
