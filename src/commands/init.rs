//! `steward init`: scaffold a config plus the templates it references.

use crate::Context;
use crate::config::{
    CommandSpec, Config, ConfigFormat, CorePackage, ExternalPackage, Host, Packages, Profile,
    TemplateSpec,
};
use crate::ui;
use anyhow::{Context as AnyhowContext, Result, bail};
use serde_json::json;
use sshkit::ValidationMode;
use std::fs;
use std::path::{Path, PathBuf};

const HAPROXY_TEMPLATE: &str = "\
global
    daemon
    maxconn 256

defaults
    mode http
    timeout connect 5000ms
    timeout client 50000ms
    timeout server 50000ms

frontend http-in
    bind *:80
    default_backend servers

backend servers
{% for b in backends %}    server {{ b.name }} {{ b.address }}:{{ b.port }} maxconn 32
{% endfor %}";

const KEEPALIVED_TEMPLATE: &str = "\
vrrp_instance VI_1 {
    state {{ state }}
    interface {{ interface }}
    virtual_router_id 51
    priority {{ priority }}
    advert_int 1
    virtual_ipaddress {
        {{ virtual_ip }}
    }
}
";

pub fn run(ctx: &Context, path: &Path, force: bool) -> Result<()> {
    let written = scaffold(path, force)?;
    if !ctx.quiet {
        for file in &written {
            ui::success(&format!("Created {}", file.display()));
        }
        ui::info("Edit the hosts section, then run 'steward apply'");
    }
    Ok(())
}

/// Write the example config and its templates. Returns the files written.
pub(crate) fn scaffold(path: &Path, force: bool) -> Result<Vec<PathBuf>> {
    let format = ConfigFormat::from_path(path)?;
    let base = path.parent().unwrap_or(Path::new(""));
    let templates = [
        (base.join("template/haproxy.cfg.j2"), HAPROXY_TEMPLATE),
        (base.join("template/keepalived.conf.j2"), KEEPALIVED_TEMPLATE),
    ];

    if !force {
        let existing: Vec<String> = std::iter::once(path)
            .chain(templates.iter().map(|(p, _)| p.as_path()))
            .filter(|p| p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if !existing.is_empty() {
            bail!(
                "Refusing to overwrite {} (use --force)",
                existing.join(", ")
            );
        }
    }

    let content = format.serialize(&example(base))?;
    let mut written = Vec::new();
    for (file, body) in std::iter::once((path.to_path_buf(), content.as_str()))
        .chain(templates.iter().map(|(p, b)| (p.clone(), *b)))
    {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        fs::write(&file, body).with_context(|| format!("Could not write {}", file.display()))?;
        log::info!("wrote {}", file.display());
        written.push(file);
    }
    Ok(written)
}

fn core(name: &str) -> CorePackage {
    CorePackage {
        name: name.to_string(),
        version: None,
    }
}

fn external(name: &str, feed: &str, packages: &[&str]) -> ExternalPackage {
    ExternalPackage {
        name: name.to_string(),
        gpg_key_url: Some(format!("https://pkgs.k8s.io/{feed}/deb/Release.key")),
        repo: Some(format!("https://pkgs.k8s.io/{feed}/deb/")),
        packages: packages.iter().map(|p| (*p).to_string()).collect(),
        version: None,
        installed: Default::default(),
    }
}

fn example(base: &Path) -> Config {
    let common = Profile {
        packages: Packages {
            core: ["apt-transport-https", "ca-certificates", "curl", "gpg"]
                .into_iter()
                .map(core)
                .collect(),
            external: vec![external(
                "kubernetes",
                "core:/stable:/v1.32",
                &["kubelet", "kubeadm", "kubectl"],
            )],
        },
        templates: vec![TemplateSpec {
            name: "haproxy".into(),
            template_file: base.join("template/haproxy.cfg.j2"),
            output_file: base.join("output/haproxy.cfg"),
            remote_file: "/etc/haproxy/haproxy.cfg".into(),
            sudo: true,
            data: json!({"backends": [
                {"name": "web1", "address": "192.168.1.101", "port": 80},
                {"name": "web2", "address": "192.168.1.102", "port": 80},
                {"name": "web3", "address": "192.168.1.103", "port": 80},
            ]}),
        }],
        commands: vec![CommandSpec {
            name: "kubeadm-version".into(),
            command: "kubeadm version -o short".into(),
            expected_output: "v1.32".into(),
            sudo: false,
            match_mode: ValidationMode::Lazy,
        }],
    };

    let host = Host {
        host: "192.168.1.10".into(),
        port: 22,
        user: "myuser".into(),
        password: Some("password".into()),
        ssh_key: None,
        profile: Profile {
            packages: Packages {
                core: vec![core("nginx")],
                external: vec![external("cri-o", "addons:/cri-o:/stable:/v1.32", &[])],
            },
            templates: vec![TemplateSpec {
                name: "keepalived".into(),
                template_file: base.join("template/keepalived.conf.j2"),
                output_file: base.join("output/keepalived.conf"),
                remote_file: "/etc/keepalived/keepalived.conf".into(),
                sudo: true,
                data: json!({
                    "virtual_ip": "192.168.1.100",
                    "interface": "eth0",
                    "priority": 100,
                    "state": "MASTER",
                }),
            }],
            commands: vec![CommandSpec {
                name: "nginx-active".into(),
                command: "systemctl is-active nginx".into(),
                expected_output: "active".into(),
                sudo: true,
                match_mode: ValidationMode::Lazy,
            }],
        },
    };

    Config {
        common,
        hosts: vec![host],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{MiniJinjaRenderer, TemplateRenderer};

    #[test]
    fn test_scaffold_loads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["steward.toml", "steward.json", "steward.yaml"] {
            let path = dir.path().join(name);
            let written = scaffold(&path, true).unwrap();
            assert_eq!(written.len(), 3);

            let config = Config::load(&path).unwrap();
            config.validate().unwrap();
            assert_eq!(config.hosts[0].profile.packages.external[0].package_names(), vec!["cri-o"]);
        }
    }

    #[test]
    fn test_scaffolded_templates_render() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steward.toml");
        scaffold(&path, false).unwrap();
        let config = Config::load(&path).unwrap();

        let haproxy = &config.common.templates[0];
        MiniJinjaRenderer
            .render(&haproxy.template_file, &haproxy.output_file, &haproxy.data)
            .unwrap();
        let rendered = fs::read_to_string(&haproxy.output_file).unwrap();
        assert!(rendered.contains("server web3 192.168.1.103:80 maxconn 32\n"));
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steward.toml");
        fs::write(&path, "# mine\n").unwrap();

        let err = scaffold(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine\n");

        scaffold(&path, true).unwrap();
        assert!(Config::load(&path).is_ok());
    }
}
