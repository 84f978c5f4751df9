//! Package and repository values.

use std::fmt;

/// Directory holding dearmored repository keys.
pub const KEYRING_DIR: &str = "/etc/apt/keyrings";

/// Directory holding per-repository source lists.
pub const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Result of an idempotent operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The host was modified
    Changed,
    /// The desired state was already present
    Unchanged,
}

impl Outcome {
    pub fn changed(self) -> bool {
        self == Outcome::Changed
    }
}

/// A package name with an optional pinned version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Pin to `version`; an empty version means unpinned.
    pub fn pinned(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.filter(|v| !v.is_empty()).map(str::to_string),
        }
    }
}

/// Formats as `name` or `name=version`, the form `apt-get install` accepts.
impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}={}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A third-party repository source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSource {
    /// Name of the list file (and of its keyring)
    pub name: String,
    /// Either a flat repository URL, or `<url> <suite> <components...>`
    pub url: String,
    /// Keyring the repository is signed by
    pub signed_by: Option<String>,
}

impl RepoSource {
    /// Repository signed by the keyring of the same name.
    pub fn signed(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            signed_by: Some(keyring_path(&name)),
            name,
            url: url.into(),
        }
    }

    pub fn unsigned(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            signed_by: None,
        }
    }

    /// The URL token used to detect an existing entry.
    pub fn base_url(&self) -> &str {
        self.url.split_whitespace().next().unwrap_or_default()
    }

    /// The `deb` line written to the source list.
    pub fn entry(&self) -> String {
        let options = self
            .signed_by
            .as_ref()
            .map(|k| format!("[signed-by={k}] "))
            .unwrap_or_default();
        let location = self.url.trim();
        if location.contains(char::is_whitespace) {
            format!("deb {options}{location}")
        } else {
            format!("deb {options}{location} /")
        }
    }

    pub fn list_path(&self) -> String {
        format!("{SOURCES_DIR}/{}.list", self.name)
    }

    /// Whether `sources` (the `deb` lines of every list) already reference
    /// this repository.
    pub fn is_listed_in(&self, sources: &str) -> bool {
        let url = self.base_url().trim_end_matches('/');
        !url.is_empty()
            && sources.lines().any(|line| {
                line.split_whitespace()
                    .any(|token| token.trim_end_matches('/') == url)
            })
    }
}

/// Path of the dearmored key named `name`.
pub fn keyring_path(name: &str) -> String {
    format!("{KEYRING_DIR}/{name}-apt-keyring.gpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_spec_display() {
        assert_eq!(PackageSpec::new("curl").to_string(), "curl");
        assert_eq!(
            PackageSpec::pinned("nginx", Some("1.24.0-1")).to_string(),
            "nginx=1.24.0-1"
        );
        assert_eq!(PackageSpec::pinned("nginx", Some("")).to_string(), "nginx");
    }

    #[test]
    fn test_flat_repository_entry() {
        let repo = RepoSource::signed("kubernetes", "https://pkgs.k8s.io/core:/stable:/v1.30/deb/");
        assert_eq!(
            repo.entry(),
            "deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/v1.30/deb/ /"
        );
        assert_eq!(repo.list_path(), "/etc/apt/sources.list.d/kubernetes.list");
    }

    #[test]
    fn test_suite_repository_entry_is_verbatim() {
        let repo = RepoSource::unsigned("docker", "https://download.docker.com/linux/debian bookworm stable");
        assert_eq!(
            repo.entry(),
            "deb https://download.docker.com/linux/debian bookworm stable"
        );
        assert_eq!(repo.base_url(), "https://download.docker.com/linux/debian");
    }

    #[test]
    fn test_is_listed_in_matches_url_token() {
        let repo = RepoSource::signed("kubernetes", "https://pkgs.k8s.io/core:/stable:/v1.30/deb/");
        let sources = "deb http://deb.debian.org/debian bookworm main\n\
                       deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/v1.30/deb /\n";
        assert!(repo.is_listed_in(sources));

        let other = RepoSource::signed("k8s-old", "https://pkgs.k8s.io/core:/stable:/v1.29/deb/");
        assert!(!other.is_listed_in(sources));
        assert!(!RepoSource::unsigned("empty", "").is_listed_in(sources));
    }
}
