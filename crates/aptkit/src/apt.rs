//! Debian driver: `apt-get` for changes, `dpkg-query` for state.

use crate::error::{Error, Result};
use crate::manager::PackageManager;
use crate::types::{KEYRING_DIR, Outcome, PackageSpec, RepoSource, keyring_path};
use log::{debug, info};
use sshkit::{RemoteCommand, Secret, Session, SessionExt, quote};

/// [`PackageManager`] for Debian-style hosts, driven over a session.
///
/// Mutating commands run through sudo with the host's secret; queries run
/// as the login user.
pub struct AptManager<'a> {
    session: &'a dyn Session,
    secret: Secret,
}

impl<'a> AptManager<'a> {
    pub fn new(session: &'a dyn Session, secret: Secret) -> Self {
        Self { session, secret }
    }

    fn host(&self) -> &str {
        self.session.host()
    }

    fn privileged(&self, line: String) -> Result<()> {
        self.session
            .execute(&RemoteCommand::root(line), &self.secret)
            .map(drop)
            .map_err(Error::from)
    }

    /// `Some(version)` when `name` is installed.
    fn query(&self, name: &str) -> Result<Option<String>> {
        let command = format!(
            "dpkg-query -W -f='${{Status}}\\t${{Version}}\\n' {} 2>/dev/null || true",
            quote(name)
        );
        let output = self.session.run_captured(&command)?;
        // Multi-arch packages print one record per architecture.
        let line = output
            .lines()
            .map(str::trim_end)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        if line.is_empty() {
            return Ok(None);
        }

        let (status, version) = line.split_once('\t').ok_or_else(|| Error::UnexpectedOutput {
            command: command.clone(),
            output: output.clone(),
        })?;
        if status.split_whitespace().last() != Some("installed") {
            debug!("[{}] {name}: {status}", self.host());
            return Ok(None);
        }
        if version.is_empty() {
            return Err(Error::UnexpectedOutput { command, output });
        }
        Ok(Some(version.to_string()))
    }
}

impl PackageManager for AptManager<'_> {
    fn refresh_index(&self) -> Result<()> {
        info!("[{}] refreshing package index", self.host());
        self.privileged("apt-get update".to_string())
    }

    fn install_gpg_key(&self, name: &str, url: &str) -> Result<Outcome> {
        let keyring = keyring_path(name);
        let exists = format!("test -f {} && echo exists || true", quote(&keyring));
        if self.session.run_captured(&exists)?.contains("exists") {
            info!("[{}] GPG key '{name}' already installed, skipping", self.host());
            return Ok(Outcome::Unchanged);
        }

        info!("[{}] installing GPG key '{name}' from {url}", self.host());
        self.privileged(format!(
            "install -d -m 0755 {KEYRING_DIR} && curl -fsSL {} | gpg --dearmor --yes -o {}",
            quote(url),
            quote(&keyring)
        ))?;
        Ok(Outcome::Changed)
    }

    fn add_repository(&self, repo: &RepoSource) -> Result<Outcome> {
        let sources = self.session.run_captured(
            "grep -h '^deb ' /etc/apt/sources.list /etc/apt/sources.list.d/*.list 2>/dev/null || true",
        )?;
        if repo.is_listed_in(&sources) {
            info!(
                "[{}] repository '{}' already added, skipping",
                self.host(),
                repo.name
            );
            return Ok(Outcome::Unchanged);
        }

        info!("[{}] adding repository '{}'", self.host(), repo.name);
        self.privileged(format!(
            "printf '%s\\n' {} > {}",
            quote(&repo.entry()),
            quote(&repo.list_path())
        ))?;
        self.refresh_index()?;
        Ok(Outcome::Changed)
    }

    fn install_package(&self, spec: &PackageSpec) -> Result<()> {
        info!("[{}] installing {spec}", self.host());
        self.privileged(format!(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
            quote(&spec.to_string())
        ))
    }

    fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.query(name)?.is_some())
    }

    fn fetch_installed_version(&self, name: &str) -> Result<String> {
        self.query(name)?.ok_or_else(|| Error::NotInstalled {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use sshkit::{ExecOutput, MockSession};

    #[test]
    fn test_install_gpg_key_is_idempotent() {
        let session = MockSession::new("web1")
            .once("test -f", ExecOutput::ok(""))
            .on("test -f", ExecOutput::ok("exists\n"));
        let apt = AptManager::new(&session, Secret::none());

        let url = "https://pkgs.k8s.io/core:/stable:/v1.30/deb/Release.key";
        assert_eq!(apt.install_gpg_key("kubernetes", url).unwrap(), Outcome::Changed);
        assert_eq!(apt.install_gpg_key("kubernetes", url).unwrap(), Outcome::Unchanged);
        assert_eq!(session.count_matching("gpg --dearmor"), 1);
        assert_eq!(session.count_matching("kubernetes-apt-keyring.gpg"), 3);
    }

    #[test]
    fn test_add_repository_is_idempotent() {
        let repo = RepoSource::signed("kubernetes", "https://pkgs.k8s.io/core:/stable:/v1.30/deb/");
        let session = MockSession::new("web1")
            .once("grep -h", ExecOutput::ok(""))
            .on("grep -h", ExecOutput::ok(format!("{}\n", repo.entry())));
        let apt = AptManager::new(&session, Secret::none());

        assert_eq!(apt.add_repository(&repo).unwrap(), Outcome::Changed);
        assert_eq!(apt.add_repository(&repo).unwrap(), Outcome::Unchanged);
        assert_eq!(session.count_matching("kubernetes.list"), 1);
        assert_eq!(session.count_matching("apt-get update"), 1);
    }

    #[test]
    fn test_install_package_runs_through_sudo() {
        let session = MockSession::new("web1");
        let apt = AptManager::new(&session, Secret::new("pw"));
        apt.install_package(&PackageSpec::pinned("curl", Some("7.88.1-10")))
            .unwrap();

        let executed = session.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[1].starts_with("SUDO_ASKPASS="));
        assert!(executed[1].contains("apt-get install -y"));
        assert!(executed[1].contains("curl=7.88.1-10"));
    }

    #[test]
    fn test_install_failure_is_remote_command_error() {
        let session =
            MockSession::new("web1").on("apt-get install", ExecOutput::failed(100, "E: no such package"));
        let apt = AptManager::new(&session, Secret::none());
        let err = apt.install_package(&PackageSpec::new("nope")).unwrap_err();
        assert_eq!(
            err.category(),
            ErrorCategory::Remote(sshkit::ErrorCategory::Command)
        );
    }

    #[test]
    fn test_fetch_installed_version() {
        let session = MockSession::new("web1")
            .on("'curl'", ExecOutput::ok("install ok installed\t7.88.1-10+deb12u5"))
            .on("'nginx'", ExecOutput::ok("deinstall ok config-files\t1.22.1-9"));
        let apt = AptManager::new(&session, Secret::none());

        assert_eq!(apt.fetch_installed_version("curl").unwrap(), "7.88.1-10+deb12u5");
        assert!(apt.is_installed("curl").unwrap());
        assert!(!apt.is_installed("nginx").unwrap());

        let err = apt.fetch_installed_version("nginx").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotInstalled);
        let err = apt.fetch_installed_version("htop").unwrap_err();
        assert!(matches!(err, Error::NotInstalled { name } if name == "htop"));
    }

    #[test]
    fn test_multi_arch_version_reads_first_record() {
        let session = MockSession::new("web1").on(
            "'libc6'",
            ExecOutput::ok(
                "install ok installed\t2.36-9+deb12u4\ninstall ok installed\t2.36-9+deb12u4\n",
            ),
        );
        let apt = AptManager::new(&session, Secret::none());

        assert_eq!(apt.fetch_installed_version("libc6").unwrap(), "2.36-9+deb12u4");
        assert!(session.executed()[0].contains("${Version}\\n'"));
    }

    #[test]
    fn test_unparsable_query_output() {
        let session = MockSession::new("web1").on("dpkg-query", ExecOutput::ok("garbage"));
        let apt = AptManager::new(&session, Secret::none());
        let err = apt.fetch_installed_version("curl").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::UnexpectedOutput);
    }
}
