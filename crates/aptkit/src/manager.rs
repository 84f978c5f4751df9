//! Package manager abstraction.
//!
//! The [`PackageManager`] trait hides how existence checks are done, so a
//! driver can use shell queries (as [`AptManager`](crate::AptManager) does)
//! or a native package-database query without changing callers.

use crate::error::Result;
use crate::types::{Outcome, PackageSpec, RepoSource};

/// Idempotent package operations on one host.
pub trait PackageManager {
    /// Re-synchronize the package index.
    fn refresh_index(&self) -> Result<()>;

    /// Import the key `name` from `url` unless a key of that name exists.
    ///
    /// An existing key is trusted as is: its content is not compared with
    /// what `url` serves.
    fn install_gpg_key(&self, name: &str, url: &str) -> Result<Outcome>;

    /// Add `repo` unless a source list already references its URL.
    /// Refreshes the index after writing a new entry.
    fn add_repository(&self, repo: &RepoSource) -> Result<Outcome>;

    /// Install (or reinstall) a package. Always issued.
    fn install_package(&self, spec: &PackageSpec) -> Result<()>;

    fn is_installed(&self, name: &str) -> Result<bool>;

    /// Installed version of `name`, or `NotInstalled`.
    fn fetch_installed_version(&self, name: &str) -> Result<String>;
}
