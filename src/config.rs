//! Fleet configuration: loading, validation and lock files.
//!
//! A config has a `common` profile applied to every host and a list of
//! hosts, each with credentials and its own profile. The same shape is
//! read from TOML or JSON depending on the file extension.

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sshkit::{Credentials, ValidationMode};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Debian package name grammar.
const PACKAGE_NAME: &str = r"^[a-z0-9][a-z0-9+.\-]*$";

/// Config file format, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `steward.yaml` and its lock file `steward.yaml.lock` are both YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = |p: &Path| p.extension().and_then(|e| e.to_str()).map(str::to_string);
        let mut ext = extension(path);
        if ext.as_deref() == Some("lock") {
            ext = path.file_stem().and_then(|stem| extension(Path::new(stem)));
        }
        match ext.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            _ => bail!(
                "Unsupported config format: {} (expected .toml, .json or .yaml)",
                path.display()
            ),
        }
    }

    pub fn parse(self, content: &str) -> Result<Config> {
        match self {
            Self::Toml => toml::from_str(content).context("Invalid TOML config"),
            Self::Json => serde_json::from_str(content).context("Invalid JSON config"),
            Self::Yaml => serde_yaml::from_str(content).context("Invalid YAML config"),
        }
    }

    pub fn serialize(self, config: &Config) -> Result<String> {
        match self {
            Self::Toml => toml::to_string_pretty(config).context("Failed to serialize config"),
            Self::Json => {
                serde_json::to_string_pretty(config).context("Failed to serialize config")
            }
            Self::Yaml => serde_yaml::to_string(config).context("Failed to serialize config"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub common: Profile,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

/// Packages, templates and commands for one scope (common or a host).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, rename = "application")]
    pub packages: Packages,
    #[serde(default, rename = "configuration", skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<TemplateSpec>,
    #[serde(default, rename = "command", skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packages {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub core: Vec<CorePackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external: Vec<ExternalPackage>,
}

/// A package from the distribution's own repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorePackage {
    pub name: String,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
}

/// A package group from a third-party repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPackage {
    pub name: String,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub gpg_key_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub repo: Option<String>,
    /// Packages to install; when empty, the group name itself is installed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    /// Pins every package of the group.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    /// Versions found after install, filled in by apply.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub installed: BTreeMap<String, String>,
}

impl ExternalPackage {
    pub fn package_names(&self) -> Vec<&str> {
        if self.packages.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.packages.iter().map(String::as_str).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    pub template_file: PathBuf,
    pub output_file: PathBuf,
    pub remote_file: String,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default)]
    pub match_mode: ValidationMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "port_from_any")]
    pub port: u16,
    pub user: String,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<String>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub ssh_key: Option<String>,
    #[serde(flatten)]
    pub profile: Profile,
}

impl Host {
    /// `ssh_key` with `~` and environment variables expanded.
    pub fn key_path(&self) -> Option<PathBuf> {
        self.ssh_key.as_deref().map(|key| {
            shellexpand::full(key)
                .map(|expanded| PathBuf::from(expanded.as_ref()))
                .unwrap_or_else(|_| PathBuf::from(shellexpand::tilde(key).as_ref()))
        })
    }

    pub fn credentials(&self) -> sshkit::Result<Credentials> {
        let key = self.key_path();
        Credentials::new(
            &self.host,
            self.port,
            &self.user,
            self.password.as_deref(),
            key.as_deref(),
        )
    }
}

const fn default_port() -> u16 {
    22
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Accept `22` as well as `"22"`.
fn port_from_any<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) if text.trim().is_empty() => Ok(default_port()),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{text}'"))),
    }
}

/// Connection settings to change on an existing host.
#[derive(Debug, Clone, Default)]
pub struct HostUpdate {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub ssh_key: Option<String>,
}

impl Config {
    /// Load a config from a `.toml`, `.json` or `.yaml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        format
            .parse(&content)
            .with_context(|| format!("Could not load {}", path.display()))
    }

    /// Write the config next to `source` as `<source>.lock`, in the
    /// source's format.
    pub fn write_lock(&self, source: &Path) -> Result<PathBuf> {
        let path = lock_path(source);
        self.save(&path)?;
        Ok(path)
    }

    /// Write the config to `path` in the format its extension names.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = ConfigFormat::from_path(path)?.serialize(self)?;
        fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
    }

    /// Append a host. Its address must be new and it needs a password or key.
    pub fn add_host(&mut self, host: Host) -> Result<()> {
        if self.hosts.iter().any(|h| h.host == host.host) {
            bail!("Host '{}' already exists", host.host);
        }
        if host.user.trim().is_empty() {
            bail!("User is required for host '{}'", host.host);
        }
        host.credentials()
            .with_context(|| format!("Invalid credentials for host '{}'", host.host))?;
        self.hosts.push(host);
        Ok(())
    }

    /// Change the connection settings of an existing host. Fields left
    /// unset (or empty) keep their current value.
    pub fn update_host(&mut self, address: &str, update: &HostUpdate) -> Result<()> {
        let host = self
            .hosts
            .iter_mut()
            .find(|h| h.host == address)
            .with_context(|| format!("Host '{address}' not found"))?;

        let given = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());
        if let Some(user) = given(&update.user) {
            host.user = user;
        }
        if let Some(port) = update.port {
            host.port = port;
        }
        if let Some(password) = given(&update.password) {
            host.password = Some(password);
        }
        if let Some(key) = given(&update.ssh_key) {
            host.ssh_key = Some(key);
        }
        Ok(())
    }

    /// Drop a host and return it.
    pub fn remove_host(&mut self, address: &str) -> Result<Host> {
        let index = self
            .hosts
            .iter()
            .position(|h| h.host == address)
            .with_context(|| format!("Host '{address}' not found"))?;
        Ok(self.hosts.remove(index))
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            bail!("No hosts configured");
        }

        let names = Regex::new(PACKAGE_NAME).context("Invalid package name pattern")?;
        self.common
            .validate(&names)
            .context("Invalid common section")?;

        let mut seen = HashSet::new();
        for (index, host) in self.hosts.iter().enumerate() {
            if host.host.trim().is_empty() {
                bail!("Host #{} has no address", index + 1);
            }
            if !seen.insert(host.host.as_str()) {
                bail!("Duplicate host '{}'", host.host);
            }
            if host.user.trim().is_empty() {
                bail!("User is required for host '{}'", host.host);
            }
            host.credentials()
                .with_context(|| format!("Invalid credentials for host '{}'", host.host))?;
            host.profile
                .validate(&names)
                .with_context(|| format!("Invalid host '{}'", host.host))?;
        }

        Ok(())
    }
}

impl Profile {
    fn validate(&self, names: &Regex) -> Result<()> {
        for pkg in &self.packages.core {
            check_name(names, "core package", &pkg.name)?;
        }
        for group in &self.packages.external {
            check_name(names, "external package", &group.name)?;
            for name in &group.packages {
                check_name(names, "package", name)
                    .with_context(|| format!("In external package '{}'", group.name))?;
            }
        }
        for template in &self.templates {
            if template.template_file.as_os_str().is_empty()
                || template.output_file.as_os_str().is_empty()
                || template.remote_file.trim().is_empty()
            {
                bail!(
                    "Template '{}' needs template_file, output_file and remote_file",
                    template.name
                );
            }
        }
        for command in &self.commands {
            if command.command.trim().is_empty() {
                bail!("Command '{}' has an empty command line", command.name);
            }
        }
        Ok(())
    }
}

fn check_name(names: &Regex, what: &str, name: &str) -> Result<()> {
    if !names.is_match(name) {
        bail!("Invalid {what} name '{name}'");
    }
    Ok(())
}

/// `config.toml` -> `config.toml.lock`.
pub fn lock_path(source: &Path) -> PathBuf {
    let mut name = source.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    source.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[common.application]
core = [{ name = "curl" }, { name = "gpg", version = "" }]

[[common.application.external]]
name = "kubernetes"
gpg_key_url = "https://pkgs.k8s.io/core:/stable:/v1.32/deb/Release.key"
repo = "https://pkgs.k8s.io/core:/stable:/v1.32/deb/"
packages = ["kubelet", "kubeadm"]

[[common.configuration]]
name = "motd"
template_file = "template/motd.j2"
output_file = "output/motd"
remote_file = "/etc/motd"
sudo = true
data = { owner = "ops", backends = [{ name = "web1", port = 80 }] }

[[common.command]]
name = "uptime"
command = "uptime"

[[hosts]]
host = "10.0.0.5"
port = "2222"
user = "deploy"
password = "hunter2"

[hosts.application]
core = [{ name = "nginx", version = "1.24.0-1" }]

[[hosts.command]]
name = "check"
command = "echo ok"
expected_output = "ok"
match_mode = "exact"
"#;

    #[test]
    fn test_parse_toml_sample() {
        let config = ConfigFormat::Toml.parse(SAMPLE).unwrap();
        assert_eq!(config.common.packages.core.len(), 2);
        assert_eq!(config.common.packages.core[1].version, None);
        assert_eq!(
            config.common.packages.external[0].package_names(),
            vec!["kubelet", "kubeadm"]
        );
        assert_eq!(config.common.templates[0].data["owner"], "ops");

        let host = &config.hosts[0];
        assert_eq!(host.port, 2222);
        assert_eq!(host.profile.packages.core[0].version.as_deref(), Some("1.24.0-1"));
        assert_eq!(host.profile.commands[0].match_mode, ValidationMode::Exact);
        assert_eq!(config.common.commands[0].match_mode, ValidationMode::Lazy);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_json_with_defaults() {
        let json = r#"{
            "hosts": [{ "host": "web1", "user": "deploy", "ssh_key": "~/.ssh/id_ed25519" }]
        }"#;
        let config = ConfigFormat::Json.parse(json).unwrap();
        let host = &config.hosts[0];
        assert_eq!(host.port, 22);
        assert!(host.password.is_none());
        assert!(host.key_path().unwrap().ends_with(".ssh/id_ed25519"));
        config.validate().unwrap();
    }

    #[test]
    fn test_group_without_packages_installs_itself() {
        let group = ExternalPackage {
            name: "cri-o".into(),
            gpg_key_url: None,
            repo: None,
            packages: vec![],
            version: None,
            installed: BTreeMap::new(),
        };
        assert_eq!(group.package_names(), vec!["cri-o"]);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_missing_credentials() {
        let mut config = ConfigFormat::Toml.parse(SAMPLE).unwrap();
        config.hosts.push(config.hosts[0].clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate host"));

        let mut config = ConfigFormat::Toml.parse(SAMPLE).unwrap();
        config.hosts[0].password = None;
        assert!(config.validate().is_err());

        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_package_names() {
        let mut config = ConfigFormat::Toml.parse(SAMPLE).unwrap();
        config.common.packages.core.push(CorePackage {
            name: "Bad Name".into(),
            version: None,
        });
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("Bad Name"));

        let mut config = ConfigFormat::Toml.parse(SAMPLE).unwrap();
        config.common.packages.core[0].name = "libstdc++6".into();
        config.validate().unwrap();
    }

    #[test]
    fn test_format_by_extension() {
        let format = |name: &str| ConfigFormat::from_path(Path::new(name)).ok();
        assert_eq!(format("fleet.json"), Some(ConfigFormat::Json));
        assert_eq!(format("steward.yml"), Some(ConfigFormat::Yaml));
        assert_eq!(format("steward.yaml.lock"), Some(ConfigFormat::Yaml));
        assert_eq!(format("steward.toml.lock"), Some(ConfigFormat::Toml));
        assert_eq!(format("steward.ini"), None);
        assert_eq!(format("steward.lock"), None);
    }

    #[test]
    fn test_lock_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("steward.toml");
        fs::write(&source, SAMPLE).unwrap();

        let config = Config::load(&source).unwrap();
        let lock = config.write_lock(&source).unwrap();
        assert_eq!(lock, dir.path().join("steward.toml.lock"));
        assert_eq!(Config::load(&lock).unwrap(), config);
    }

    const YAML_SAMPLE: &str = r#"
common:
  application:
    core:
      - name: "keepalived"
        manager: "apt"
        version: "2.0.20"
    external:
      - name: "cri-o"
        gpg_key_url: "https://pkgs.k8s.io/addons:/cri-o:/stable:/v1.32/deb/Release.key"
        repo: "https://pkgs.k8s.io/addons:/cri-o:/stable:/v1.32/deb/"
        manager: "apt"
        version: "1.32"
  configuration:
    - name: "haproxy"
      template_file: "./template/haproxy_template.cfg"
      output_file: "./output/haproxy.cfg"
      remote_file: "/etc/haproxy/haproxy.cfg"
      sudo: true
      data:
        backends:
          - name: web1
            address: 192.168.1.101
            port: 80
hosts:
  - host: "192.168.100.14"
    port: "22"
    user: "admin"
    password: "admin"
    ssh_key: ""
    application:
      core:
        - name: "nginx"
          manager: ""
          version: ""
    command:
      - name: "install-nginx"
        command: "apt-get install -y nginx"
        expected_output: ""
        sudo: true
"#;

    #[test]
    fn test_parse_yaml_config() {
        let config = ConfigFormat::Yaml.parse(YAML_SAMPLE).unwrap();
        assert_eq!(config.common.packages.core[0].name, "keepalived");
        assert_eq!(config.common.packages.core[0].version.as_deref(), Some("2.0.20"));
        assert_eq!(config.common.packages.external[0].name, "cri-o");
        assert_eq!(config.common.templates[0].data["backends"][0]["port"], 80);

        let host = &config.hosts[0];
        assert_eq!(host.host, "192.168.100.14");
        assert_eq!(host.port, 22);
        assert!(host.ssh_key.is_none());
        assert_eq!(host.profile.packages.core[0].version, None);
        assert!(host.profile.commands[0].sudo);
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_lock_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("config.yaml");
        fs::write(&source, YAML_SAMPLE).unwrap();

        let config = Config::load(&source).unwrap();
        let lock = config.write_lock(&source).unwrap();
        assert_eq!(lock, dir.path().join("config.yaml.lock"));
        assert_eq!(Config::load(&lock).unwrap(), config);
    }

    fn new_host(address: &str) -> Host {
        Host {
            host: address.into(),
            port: 22,
            user: "deploy".into(),
            password: None,
            ssh_key: Some("~/.ssh/id_ed25519".into()),
            profile: Profile::default(),
        }
    }

    #[test]
    fn test_add_host_rejects_duplicates_and_missing_credentials() {
        let mut config = ConfigFormat::Toml.parse(SAMPLE).unwrap();
        config.add_host(new_host("10.0.0.6")).unwrap();
        assert_eq!(config.hosts.len(), 2);

        let err = config.add_host(new_host("10.0.0.6")).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let no_auth = Host {
            ssh_key: None,
            ..new_host("10.0.0.7")
        };
        assert!(config.add_host(no_auth).is_err());
        assert_eq!(config.hosts.len(), 2);
    }

    #[test]
    fn test_update_host_keeps_unset_fields() {
        let mut config = ConfigFormat::Toml.parse(SAMPLE).unwrap();
        let update = HostUpdate {
            user: Some("ops".into()),
            password: Some(String::new()),
            ..HostUpdate::default()
        };
        config.update_host("10.0.0.5", &update).unwrap();

        let host = &config.hosts[0];
        assert_eq!(host.user, "ops");
        assert_eq!(host.password.as_deref(), Some("hunter2"));
        assert_eq!(host.port, 2222);

        assert!(config.update_host("10.9.9.9", &update).is_err());
    }

    #[test]
    fn test_remove_host() {
        let mut config = ConfigFormat::Toml.parse(SAMPLE).unwrap();
        assert!(config.remove_host("10.9.9.9").is_err());
        let removed = config.remove_host("10.0.0.5").unwrap();
        assert_eq!(removed.user, "deploy");
        assert!(config.hosts.is_empty());
    }
}
