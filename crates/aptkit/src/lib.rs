//! # aptkit
//!
//! Idempotent Debian package management over an [`sshkit::Session`].
//!
//! Keys and repositories are checked before they are written, so applying
//! the same state to an already provisioned host issues only read-only queries.
//! Package installs are always issued; `apt-get` no-ops on satisfied
//! requests.
//!
//! ## Example
//!
//! ```no_run
//! use aptkit::{AptManager, PackageManager, PackageSpec, RepoSource};
//! use sshkit::{Connector, Credentials, Ssh2Connector};
//!
//! let creds = Credentials::new("10.0.0.5", 22, "deploy", Some("hunter2"), None).unwrap();
//! let session = Ssh2Connector.connect(&creds).unwrap();
//! let apt = AptManager::new(session.as_ref(), creds.sudo_secret().clone());
//!
//! apt.refresh_index().unwrap();
//! apt.install_gpg_key("docker", "https://download.docker.com/linux/debian/gpg").unwrap();
//! apt.add_repository(&RepoSource::signed(
//!     "docker",
//!     "https://download.docker.com/linux/debian bookworm stable",
//! ))
//! .unwrap();
//! apt.install_package(&PackageSpec::new("docker-ce")).unwrap();
//! println!("{}", apt.fetch_installed_version("docker-ce").unwrap());
//! ```

#![warn(clippy::all)]

pub mod apt;
pub mod error;
pub mod manager;
pub mod types;

pub use apt::AptManager;
pub use error::{Error, ErrorCategory, Result};
pub use manager::PackageManager;
pub use types::{KEYRING_DIR, Outcome, PackageSpec, RepoSource, SOURCES_DIR, keyring_path};
