//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout dbconnect.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `UnknownBackendType`: Caller asked for a backend that is not supported
//! - `UnknownDriverModule`: No native driver or builder registered for a driver kind
//! - `SocketNotFound`: Resolved Unix-domain socket path is not a socket
//! - `MalformedEndpoint`: Endpoint descriptor could not be parsed
//! - `EnvironmentNotInitialized`: Process-wide driver bootstrap has not run
//! - `ConnectionFailed`: Physical connection errors
//! - `QueryFailed`: Statement execution errors reported by the native driver
//! - `Unsupported`: Operation not available for this backend flavor
//! - `InvalidInput`: Malformed arguments
//! - `ConfigError`: Configuration file or role registry errors

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for dbconnect operations
#[derive(Error, Debug)]
pub enum DbConnectError {
    /// Backend type name is not one of the supported backends
    #[error("Unknown database type: {0}")]
    UnknownBackendType(String),

    /// Driver kind has no registered native driver or connector builder
    #[error("Unknown DBAPI module: {0}")]
    UnknownDriverModule(String),

    /// Socket path does not exist or is not a Unix-domain socket
    #[error("No such socket file: {}", .0.display())]
    SocketNotFound(PathBuf),

    /// Endpoint descriptor is not `unix:<path>[:<port>]` or `tcp:<host>[:<port>]`
    #[error("Malformed endpoint: {0}")]
    MalformedEndpoint(String),

    /// A driver precondition on process state has not been satisfied
    #[error("Environment not initialized: {0}")]
    EnvironmentNotInitialized(String),

    /// Physical connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Operation not supported by this backend
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DbConnectError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownBackendType(_) => "UNKNOWN_BACKEND_TYPE",
            Self::UnknownDriverModule(_) => "UNKNOWN_DRIVER_MODULE",
            Self::SocketNotFound(_) => "SOCKET_NOT_FOUND",
            Self::MalformedEndpoint(_) => "MALFORMED_ENDPOINT",
            Self::EnvironmentNotInitialized(_) => "ENVIRONMENT_NOT_INITIALIZED",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message
    ///
    /// Messages never contain passwords; connect arguments are not echoed.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn unknown_backend_type(name: impl Into<String>) -> Self {
        Self::UnknownBackendType(name.into())
    }

    pub fn unknown_driver_module(name: impl Into<String>) -> Self {
        Self::UnknownDriverModule(name.into())
    }

    pub fn socket_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SocketNotFound(path.into())
    }

    pub fn malformed_endpoint(message: impl Into<String>) -> Self {
        Self::MalformedEndpoint(message.into())
    }

    pub fn environment_not_initialized(message: impl Into<String>) -> Self {
        Self::EnvironmentNotInitialized(message.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for dbconnect operations
pub type Result<T> = std::result::Result<T, DbConnectError>;
