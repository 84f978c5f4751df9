//! Error types for package operations.

use thiserror::Error;

/// Categories of package errors, used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The underlying session failed
    Remote(sshkit::ErrorCategory),
    /// Version queried for a package that is not installed
    NotInstalled,
    /// A query printed something that could not be parsed
    UnexpectedOutput,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Remote(inner) => inner.description(),
            Self::NotInstalled => "Package not installed",
            Self::UnexpectedOutput => "Unexpected package database output",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Remote(inner) => inner.advice(),
            Self::NotInstalled => "Check the package name and that the install step succeeded",
            Self::UnexpectedOutput => "Run the query by hand on the host and check dpkg's state",
        }
    }
}

/// Errors from the package manager driver.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Remote(#[from] sshkit::Error),

    #[error("package '{name}' is not installed")]
    NotInstalled { name: String },

    #[error("unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Remote(inner) => ErrorCategory::Remote(inner.category()),
            Error::NotInstalled { .. } => ErrorCategory::NotInstalled,
            Error::UnexpectedOutput { .. } => ErrorCategory::UnexpectedOutput,
        }
    }
}

/// Result type for package operations.
pub type Result<T> = std::result::Result<T, Error>;
