//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit.

use std::fmt;
use std::io;

use crate::reparent::ReparentError;
use crate::topology::TopologyError;

/// Error classes a command can end with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, runtime)
    IoError,
    /// Malformed shard or tablet argument
    InvalidArgument,
    /// Topology file missing, corrupt or inconsistent
    TopologyError,
    /// Reparent stopped with a fatal error
    ReparentFailed,
}

impl CliErrorCode {
    /// Stable code printed in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "WRANGLER_CLI_CONFIG_ERROR",
            Self::IoError => "WRANGLER_CLI_IO_ERROR",
            Self::InvalidArgument => "WRANGLER_CLI_INVALID_ARGUMENT",
            Self::TopologyError => "WRANGLER_CLI_TOPOLOGY_ERROR",
            Self::ReparentFailed => "WRANGLER_CLI_REPARENT_FAILED",
        }
    }
}

/// Fatal CLI error: a code plus a human-readable message.
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidArgument, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Stable code printed in error responses.
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<TopologyError> for CliError {
    fn from(e: TopologyError) -> Self {
        Self::new(CliErrorCode::TopologyError, e.to_string())
    }
}

impl From<ReparentError> for CliError {
    fn from(e: ReparentError) -> Self {
        Self::new(CliErrorCode::ReparentFailed, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
