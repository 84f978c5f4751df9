//! `steward host`: edit the host list of a config file in place.

use crate::Context;
use crate::cli::{ConnectionArgs, HostCommand};
use crate::config::{Config, Host, HostUpdate, Profile};
use crate::ui;
use anyhow::Result;
use std::path::Path;

pub fn run(ctx: &Context, command: &HostCommand) -> Result<()> {
    let (path, message) = match command {
        HostCommand::Add {
            config,
            host,
            connection,
        } => {
            add(&config.config, host, connection)?;
            (&config.config, format!("Host {host} added"))
        }
        HostCommand::Update {
            config,
            host,
            connection,
        } => {
            update(&config.config, host, connection)?;
            (&config.config, format!("Host {host} updated"))
        }
        HostCommand::Delete { config, host } => {
            delete(&config.config, host)?;
            (&config.config, format!("Host {host} deleted"))
        }
    };

    log::info!("{message} in {}", path.display());
    if !ctx.quiet {
        ui::success(&format!("{message} in {}", path.display()));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

pub(crate) fn add(path: &Path, address: &str, connection: &ConnectionArgs) -> Result<()> {
    let mut config = Config::load(path)?;
    config.add_host(Host {
        host: address.to_string(),
        port: connection.port.unwrap_or(22),
        user: non_empty(&connection.user).unwrap_or_default(),
        password: non_empty(&connection.password),
        ssh_key: non_empty(&connection.ssh_key),
        profile: Profile::default(),
    })?;
    config.save(path)
}

pub(crate) fn update(path: &Path, address: &str, connection: &ConnectionArgs) -> Result<()> {
    let mut config = Config::load(path)?;
    config.update_host(
        address,
        &HostUpdate {
            user: connection.user.clone(),
            port: connection.port,
            password: connection.password.clone(),
            ssh_key: connection.ssh_key.clone(),
        },
    )?;
    config.save(path)
}

pub(crate) fn delete(path: &Path, address: &str) -> Result<()> {
    let mut config = Config::load(path)?;
    config.remove_host(address)?;
    config.save(path)
}
