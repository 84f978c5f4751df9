//! The sequential pipeline run for a single host.

use super::plan::{HostPlan, Scope};
use super::status::{Counter, Failure, FailureKind, Phase};
use super::{InstalledVersion, Tracker};
use crate::template::{TemplateError, TemplateRenderer};
use aptkit::{AptManager, PackageManager, PackageSpec, RepoSource};
use log::{error, info};
use sshkit::{Connector, Secret, Session, SessionExt};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Remote(#[from] sshkit::Error),
    #[error(transparent)]
    Package(#[from] aptkit::Error),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl StepError {
    fn kind(&self) -> FailureKind {
        match self {
            Self::Remote(e) => e.category().into(),
            Self::Package(e) => e.category().into(),
            Self::Template(_) => FailureKind::Template,
        }
    }
}

/// Run one host's plan until it completes or hits its first error.
///
/// Returns the versions discovered before the run ended.
pub(crate) fn run(
    index: usize,
    plan: &HostPlan,
    connector: &dyn Connector,
    renderer: &dyn TemplateRenderer,
    tracker: &Tracker<'_>,
) -> Vec<InstalledVersion> {
    let mut host = HostRun {
        index,
        plan,
        renderer,
        tracker,
        phase: Phase::Pending,
        found: Vec::new(),
    };

    match host.execute(connector) {
        Ok(()) => {
            info!("[{}] completed", plan.address());
            tracker.complete(index);
        }
        Err(err) => {
            error!("[{}] failed while {}: {err}", plan.address(), host.phase);
            tracker.fail(
                index,
                Failure {
                    kind: err.kind(),
                    phase: host.phase,
                    message: err.to_string(),
                },
            );
        }
    }
    host.found
}

struct HostRun<'a, 't> {
    index: usize,
    plan: &'a HostPlan,
    renderer: &'a dyn TemplateRenderer,
    tracker: &'a Tracker<'t>,
    phase: Phase,
    found: Vec<InstalledVersion>,
}

impl HostRun<'_, '_> {
    fn host(&self) -> &str {
        self.plan.address()
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        info!("[{}] {phase}", self.host());
        self.tracker.enter(self.index, phase);
    }

    fn execute(&mut self, connector: &dyn Connector) -> Result<(), StepError> {
        self.enter(Phase::Connecting);
        let credentials = self.plan.host.credentials()?;
        let session = connector.connect(&credentials)?;
        let session = session.as_ref();
        let secret = credentials.sudo_secret();
        let apt = AptManager::new(session, secret.clone());

        self.enter(Phase::RefreshingIndex);
        apt.refresh_index()?;

        self.enter(Phase::InstallingCommonCore);
        self.install_core(&apt, Scope::Common)?;
        self.enter(Phase::InstallingHostCore);
        self.install_core(&apt, Scope::Host)?;

        self.enter(Phase::InstallingCommonExternal);
        self.install_external(&apt, Scope::Common)?;
        self.enter(Phase::InstallingHostExternal);
        self.install_external(&apt, Scope::Host)?;

        self.enter(Phase::RenderingCommonTemplates);
        self.place_templates(session, secret, Scope::Common)?;
        self.enter(Phase::RenderingHostTemplates);
        self.place_templates(session, secret, Scope::Host)?;

        self.enter(Phase::RunningCommonCommands);
        self.run_commands(session, secret, Scope::Common)?;
        self.enter(Phase::RunningHostCommands);
        self.run_commands(session, secret, Scope::Host)?;

        Ok(())
    }

    fn install_core(&mut self, apt: &impl PackageManager, scope: Scope) -> Result<(), StepError> {
        let plan = self.plan;
        for pkg in &plan.profile(scope).packages.core {
            apt.install_package(&PackageSpec::pinned(&pkg.name, pkg.version.as_deref()))?;
            self.record(apt, scope, None, &pkg.name)?;
        }
        Ok(())
    }

    /// Key, then repository, then each package of every group.
    fn install_external(
        &mut self,
        apt: &impl PackageManager,
        scope: Scope,
    ) -> Result<(), StepError> {
        let plan = self.plan;
        for group in &plan.profile(scope).packages.external {
            if let Some(url) = &group.gpg_key_url {
                apt.install_gpg_key(&group.name, url)?;
            }
            if let Some(repo) = &group.repo {
                let source = if group.gpg_key_url.is_some() {
                    RepoSource::signed(&group.name, repo)
                } else {
                    RepoSource::unsigned(&group.name, repo)
                };
                apt.add_repository(&source)?;
            }
            for name in group.package_names() {
                apt.install_package(&PackageSpec::pinned(name, group.version.as_deref()))?;
                self.record(apt, scope, Some(&group.name), name)?;
            }
        }
        Ok(())
    }

    /// Look up the installed version and count the package as done.
    fn record(
        &mut self,
        apt: &impl PackageManager,
        scope: Scope,
        group: Option<&str>,
        package: &str,
    ) -> Result<(), StepError> {
        let version = apt.fetch_installed_version(package)?;
        info!("[{}] {package} {version} installed", self.host());
        self.found.push(InstalledVersion {
            scope,
            group: group.map(str::to_string),
            package: package.to_string(),
            version,
        });
        self.tracker.advance(self.index, Counter::Packages);
        Ok(())
    }

    fn place_templates(
        &self,
        session: &dyn Session,
        secret: &Secret,
        scope: Scope,
    ) -> Result<(), StepError> {
        for template in &self.plan.profile(scope).templates {
            let output = host_output(&template.output_file, self.host());
            self.renderer
                .render(&template.template_file, &output, &template.data)?;
            if template.sudo {
                session.transfer_with_privilege(&output, &template.remote_file, secret)?;
            } else {
                session.transfer(&output, &template.remote_file)?;
            }
            self.tracker.advance(self.index, Counter::Templates);
        }
        Ok(())
    }

    fn run_commands(
        &self,
        session: &dyn Session,
        secret: &Secret,
        scope: Scope,
    ) -> Result<(), StepError> {
        for command in &self.plan.profile(scope).commands {
            info!("[{}] running '{}'", self.host(), command.name);
            if command.sudo {
                session.run_validated_with_privilege(
                    &command.command,
                    &command.expected_output,
                    command.match_mode,
                    secret,
                )?;
            } else {
                session.run_validated(
                    &command.command,
                    &command.expected_output,
                    command.match_mode,
                )?;
            }
            self.tracker.advance(self.index, Counter::Commands);
        }
        Ok(())
    }
}

/// `output/app.conf` rendered for `web1` lands at `output/app.conf.web1`.
///
/// Hosts render in parallel, so a shared output path would let one host
/// upload another host's file.
pub(crate) fn host_output(output: &Path, host: &str) -> PathBuf {
    let tag: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{tag}"));
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_output_is_a_sibling_per_host() {
        let output = Path::new("output/keepalived.conf");
        assert_eq!(
            host_output(output, "lb1"),
            PathBuf::from("output/keepalived.conf.lb1")
        );
        assert_eq!(
            host_output(output, "fe80::1"),
            PathBuf::from("output/keepalived.conf.fe80__1")
        );
    }
}
