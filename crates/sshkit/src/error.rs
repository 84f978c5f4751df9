//! Error types for remote session operations.
//!
//! Every error carries the host it happened on and the command or path
//! involved, so a single value is enough to report a host failure.

use crate::command::ValidationMode;
use thiserror::Error;

/// Categories of remote errors, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or unusable authentication material
    Credential,
    /// Transport or authentication failure
    Connect,
    /// Remote command exited non-zero
    Command,
    /// Remote command succeeded but printed unexpected output
    Validation,
    /// Local or remote filesystem failure while placing a file
    Transfer,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Credential => "Missing credentials",
            Self::Connect => "Connection failed",
            Self::Command => "Remote command failed",
            Self::Validation => "Unexpected command output",
            Self::Transfer => "File transfer failed",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Credential => "Set a password or ssh_key for the host",
            Self::Connect => "Check the address, port, user and credentials of the host",
            Self::Command => "Inspect the command's stderr in the log file",
            Self::Validation => "Compare expected_output with what the command prints",
            Self::Transfer => "Check the local file and the remote destination permissions",
        }
    }
}

/// Errors that can occur while talking to a remote host.
#[derive(Debug, Error)]
pub enum Error {
    /// Neither a password nor a private key was supplied
    #[error("no credentials for {user}@{host}: a password or private key is required")]
    Credential {
        /// Host address
        host: String,
        /// Login user
        user: String,
    },

    /// TCP, handshake, authentication or channel failure
    #[error("connection to {host} failed: {message}")]
    Connect {
        /// Host address
        host: String,
        /// Underlying cause
        message: String,
    },

    /// Remote command exited with a non-zero status
    #[error("command failed on {host} (exit {exit_code}): {command}: {}", stderr.trim())]
    Command {
        /// Host address
        host: String,
        /// The command as requested (before privilege resolution)
        command: String,
        /// Remote exit status
        exit_code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// Remote command succeeded but its output did not match
    #[error("output validation failed on {host} ({mode}): expected {expected:?}, got {actual:?}")]
    Validation {
        /// Host address
        host: String,
        /// The command whose output was checked
        command: String,
        /// Comparison used
        mode: ValidationMode,
        /// Expected output (or substring)
        expected: String,
        /// Captured standard output
        actual: String,
    },

    /// File could not be read locally or placed remotely
    #[error("transfer to {host}:{path} failed: {message}")]
    Transfer {
        /// Host address
        host: String,
        /// Remote destination path
        path: String,
        /// Underlying cause
        message: String,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Credential { .. } => ErrorCategory::Credential,
            Error::Connect { .. } => ErrorCategory::Connect,
            Error::Command { .. } => ErrorCategory::Command,
            Error::Validation { .. } => ErrorCategory::Validation,
            Error::Transfer { .. } => ErrorCategory::Transfer,
        }
    }

    /// Host the error happened on.
    pub fn host(&self) -> &str {
        match self {
            Error::Credential { host, .. }
            | Error::Connect { host, .. }
            | Error::Command { host, .. }
            | Error::Validation { host, .. }
            | Error::Transfer { host, .. } => host,
        }
    }

    pub(crate) fn connect(host: &str, message: impl ToString) -> Self {
        Error::Connect {
            host: host.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn transfer(host: &str, path: &str, message: impl ToString) -> Self {
        Error::Transfer {
            host: host.to_string(),
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, Error>;
