//! Command values and output types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote path of the one-shot sudo password helper.
pub const ASKPASS_PATH: &str = "/tmp/.steward-askpass";

/// Prefix for files staged in `/tmp` before a privileged move.
pub const STAGING_PREFIX: &str = "/tmp/steward-";

/// Privilege level a remote command runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Run as the login user
    #[default]
    User,
    /// Run through sudo
    Root,
}

/// A shell command plus the privilege it needs.
///
/// The line is never rewritten: escalation wraps the whole line in
/// `sudo sh -c '<line>'`, so a literal "sudo" inside an argument is left
/// alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Shell command line
    pub line: String,
    /// Privilege level
    pub privilege: Privilege,
}

impl RemoteCommand {
    /// Command run as the login user.
    pub fn user(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            privilege: Privilege::User,
        }
    }

    /// Command run through sudo.
    pub fn root(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            privilege: Privilege::Root,
        }
    }

    /// Build from a line and a `sudo` flag.
    pub fn with_sudo(line: impl Into<String>, sudo: bool) -> Self {
        if sudo {
            Self::root(line)
        } else {
            Self::user(line)
        }
    }

    /// Resolve into the exact line sent to the remote shell.
    ///
    /// `askpass` selects between the password helper (`sudo -A`) and
    /// password-less sudo (`sudo -n`).
    pub fn resolve(&self, askpass: bool) -> String {
        match (self.privilege, askpass) {
            (Privilege::User, _) => self.line.clone(),
            (Privilege::Root, true) => format!(
                "SUDO_ASKPASS={} sudo -A sh -c {}",
                ASKPASS_PATH,
                quote(&self.line)
            ),
            (Privilege::Root, false) => format!("sudo -n sh -c {}", quote(&self.line)),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.privilege {
            Privilege::User => write!(f, "{}", self.line),
            Privilege::Root => write!(f, "[sudo] {}", self.line),
        }
    }
}

/// How captured output is compared with the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Byte-exact equality
    Exact,
    /// Expected value must be a substring of the output
    #[default]
    Lazy,
}

impl ValidationMode {
    /// Check captured output against the expected value.
    pub fn matches(&self, actual: &str, expected: &str) -> bool {
        match self {
            ValidationMode::Exact => actual == expected,
            ValidationMode::Lazy => actual.contains(expected),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Exact => write!(f, "exact"),
            ValidationMode::Lazy => write!(f, "lazy"),
        }
    }
}

/// Output of one remote execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Sudo password for a host. `Debug` never prints the value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(Option<String>);

impl Secret {
    /// Wrap a password; an empty string means no password.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self(None)
        } else {
            Self(Some(value))
        }
    }

    /// No password: escalation uses `sudo -n`.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn expose(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => write!(f, "Secret(***)"),
            None => write!(f, "Secret(None)"),
        }
    }
}

/// Quote a string for a POSIX shell.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell line that writes the askpass helper for `password`.
///
/// The helper prints the password; it stays on the remote filesystem in
/// plain text until overwritten.
pub(crate) fn askpass_install_line(password: &str) -> String {
    let body = format!("printf '%s\\n' {}", quote(password));
    format!(
        "umask 077 && printf '%s\\n' '#!/bin/sh' {} > {path} && chmod 700 {path}",
        quote(&body),
        path = ASKPASS_PATH
    )
}

/// Parent directory of a POSIX remote path, if it has one worth creating.
pub(crate) fn remote_parent(path: &str) -> Option<&str> {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => None,
        Some((parent, _)) => Some(parent),
    }
}
