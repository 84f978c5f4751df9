//! Effective per-host work after merging the common profile.

use crate::config::{Config, Host, Profile};
use serde::Serialize;
use std::collections::HashSet;

/// Which part of the config an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Scope {
    Common,
    Host,
}

/// Work for one host: the common items it inherits and its own items.
///
/// Common items shadowed by a host item of the same kind and name are
/// dropped, so host-specific settings win without the two lists being
/// interleaved.
#[derive(Debug, Clone)]
pub struct HostPlan {
    pub host: Host,
    pub common: Profile,
}

impl HostPlan {
    pub fn resolve(common: &Profile, host: &Host) -> Self {
        let own = &host.profile;
        let mut inherited = common.clone();

        let core: HashSet<&str> = own.packages.core.iter().map(|p| p.name.as_str()).collect();
        inherited
            .packages
            .core
            .retain(|p| !core.contains(p.name.as_str()));

        let external: HashSet<&str> = own
            .packages
            .external
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        inherited
            .packages
            .external
            .retain(|g| !external.contains(g.name.as_str()));

        let templates: HashSet<&str> = own.templates.iter().map(|t| t.name.as_str()).collect();
        inherited
            .templates
            .retain(|t| !templates.contains(t.name.as_str()));

        let commands: HashSet<&str> = own.commands.iter().map(|c| c.name.as_str()).collect();
        inherited
            .commands
            .retain(|c| !commands.contains(c.name.as_str()));

        Self {
            host: host.clone(),
            common: inherited,
        }
    }

    /// One plan per host, in config order.
    pub fn resolve_all(config: &Config) -> Vec<Self> {
        config
            .hosts
            .iter()
            .map(|host| Self::resolve(&config.common, host))
            .collect()
    }

    pub fn address(&self) -> &str {
        &self.host.host
    }

    pub fn own(&self) -> &Profile {
        &self.host.profile
    }

    pub fn profile(&self, scope: Scope) -> &Profile {
        match scope {
            Scope::Common => &self.common,
            Scope::Host => self.own(),
        }
    }

    /// Core packages plus every package of every external group.
    pub fn package_count(&self) -> usize {
        [Scope::Common, Scope::Host]
            .iter()
            .map(|&scope| {
                let packages = &self.profile(scope).packages;
                packages.core.len()
                    + packages
                        .external
                        .iter()
                        .map(|g| g.package_names().len())
                        .sum::<usize>()
            })
            .sum()
    }

    pub fn template_count(&self) -> usize {
        self.common.templates.len() + self.own().templates.len()
    }

    pub fn command_count(&self) -> usize {
        self.common.commands.len() + self.own().commands.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandSpec, CorePackage, ExternalPackage, Packages};

    fn core(name: &str, version: Option<&str>) -> CorePackage {
        CorePackage {
            name: name.into(),
            version: version.map(Into::into),
        }
    }

    fn command(name: &str, line: &str) -> CommandSpec {
        CommandSpec {
            name: name.into(),
            command: line.into(),
            expected_output: String::new(),
            sudo: false,
            match_mode: Default::default(),
        }
    }

    fn host(profile: Profile) -> Host {
        Host {
            host: "web1".into(),
            port: 22,
            user: "deploy".into(),
            password: Some("pw".into()),
            ssh_key: None,
            profile,
        }
    }

    #[test]
    fn test_host_item_shadows_common_item() {
        let common = Profile {
            packages: Packages {
                core: vec![core("curl", None), core("nginx", None)],
                external: vec![],
            },
            templates: vec![],
            commands: vec![command("check", "echo common")],
        };
        let own = Profile {
            packages: Packages {
                core: vec![core("nginx", Some("1.24.0-1"))],
                external: vec![],
            },
            templates: vec![],
            commands: vec![command("check", "echo host")],
        };

        let plan = HostPlan::resolve(&common, &host(own));
        assert_eq!(plan.common.packages.core, vec![core("curl", None)]);
        assert!(plan.common.commands.is_empty());
        assert_eq!(plan.own().commands[0].command, "echo host");
        assert_eq!(plan.package_count(), 2);
        assert_eq!(plan.command_count(), 1);
    }

    #[test]
    fn test_package_count_includes_external_packages() {
        let group = |name: &str, packages: &[&str]| ExternalPackage {
            name: name.into(),
            gpg_key_url: Some("https://example.com/key".into()),
            repo: Some("https://example.com/deb/".into()),
            packages: packages.iter().map(|p| (*p).to_string()).collect(),
            version: None,
            installed: Default::default(),
        };
        let common = Profile {
            packages: Packages {
                core: vec![core("curl", None)],
                external: vec![group("kubernetes", &["kubelet", "kubeadm", "kubectl"])],
            },
            ..Profile::default()
        };
        let own = Profile {
            packages: Packages {
                core: vec![],
                external: vec![group("cri-o", &[])],
            },
            ..Profile::default()
        };

        let plan = HostPlan::resolve(&common, &host(own));
        assert_eq!(plan.package_count(), 5);
        assert_eq!(plan.template_count(), 0);
    }
}
