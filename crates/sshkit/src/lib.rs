//! # sshkit
//!
//! Remote command execution and file transfer over SSH.
//!
//! This crate provides:
//! - [`Credentials`] validated before any network I/O
//! - A [`Session`] trait with a libssh2 implementation ([`Ssh2Session`])
//! - Privilege escalation through a one-shot `sudo -A` helper, without
//!   rewriting the command line
//! - Output validation in exact or substring mode
//! - Scripted [`MockSession`]s for tests
//!
//! ## Example
//!
//! ```no_run
//! use sshkit::{Connector, Credentials, SessionExt, Ssh2Connector, ValidationMode};
//! use std::path::Path;
//!
//! let creds = Credentials::new("10.0.0.5", 22, "deploy", Some("hunter2"), None).unwrap();
//! let session = Ssh2Connector.connect(&creds).unwrap();
//!
//! session.run_with_privilege("apt-get update", creds.sudo_secret()).unwrap();
//! session.run_validated("nginx -v 2>&1", "nginx/", ValidationMode::Lazy).unwrap();
//! session
//!     .transfer_with_privilege(Path::new("nginx.conf"), "/etc/nginx/nginx.conf", creds.sudo_secret())
//!     .unwrap();
//! ```

#![warn(clippy::all)]

pub mod command;
pub mod credentials;
pub mod error;
pub mod mock;
pub mod session;
pub mod ssh;

pub use command::{
    ASKPASS_PATH, ExecOutput, Privilege, RemoteCommand, STAGING_PREFIX, Secret, ValidationMode,
    quote,
};
pub use credentials::{Auth, Credentials};
pub use error::{Error, ErrorCategory, Result};
pub use mock::{MockConnector, MockSession};
pub use session::{Connector, Session, SessionExt};
pub use ssh::{Ssh2Connector, Ssh2Session};
