use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "steward")]
#[command(version)]
#[command(about = "Provision a fleet of Debian hosts over SSH", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Where log records are written
    #[arg(
        long,
        global = true,
        env = "STEWARD_LOG_FILE",
        default_value = "steward.log"
    )]
    pub log_file: PathBuf,

    /// Copy log records to stderr
    #[arg(long, global = true)]
    pub log_console: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install packages, place templates and run commands on every host
    Apply(ApplyArgs),

    /// Check a config file without connecting to any host
    Validate(ConfigArg),

    /// Add, update or delete hosts in a config file
    #[command(subcommand)]
    Host(HostCommand),

    /// Write an example config to start from
    Init {
        /// Destination (.toml, .json or .yaml)
        #[arg(default_value = "steward.toml")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum HostCommand {
    /// Append a host (needs a user and a password or key)
    Add {
        #[command(flatten)]
        config: ConfigArg,

        /// Host address
        #[arg(short = 'H', long)]
        host: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Change the connection settings of a host
    Update {
        #[command(flatten)]
        config: ConfigArg,

        /// Host address
        #[arg(short = 'H', long)]
        host: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Remove a host
    Delete {
        #[command(flatten)]
        config: ConfigArg,

        /// Host address
        #[arg(short = 'H', long)]
        host: String,
    },
}

#[derive(Parser)]
pub struct ConnectionArgs {
    /// Login user
    #[arg(short, long)]
    pub user: Option<String>,

    /// SSH port (default 22 for new hosts)
    #[arg(long)]
    pub port: Option<u16>,

    /// Password, also used for sudo
    #[arg(short, long)]
    pub password: Option<String>,

    /// Private key path
    #[arg(short = 'k', long = "key")]
    pub ssh_key: Option<String>,
}

#[derive(Parser)]
pub struct ConfigArg {
    /// Config file (.toml, .json or .yaml)
    #[arg(
        short,
        long,
        env = "STEWARD_CONFIG",
        default_value = "steward.toml"
    )]
    pub config: PathBuf,
}

#[derive(Parser)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Dry run - print each host's plan without connecting
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not write the <config>.lock file
    #[arg(long)]
    pub no_lock: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from(["steward", "-vv", "apply", "-c", "fleet.json", "--yes", "--no-lock"]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.config.config, PathBuf::from("fleet.json"));
        assert!(args.yes);
        assert!(args.no_lock);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_host_add_flags() {
        let cli = Cli::parse_from([
            "steward", "host", "add", "-c", "fleet.yaml", "-H", "10.0.0.9", "-u", "deploy", "-k",
            "~/.ssh/id_ed25519",
        ]);
        let Command::Host(HostCommand::Add {
            config,
            host,
            connection,
        }) = cli.command
        else {
            panic!("expected host add");
        };
        assert_eq!(config.config, PathBuf::from("fleet.yaml"));
        assert_eq!(host, "10.0.0.9");
        assert_eq!(connection.user.as_deref(), Some("deploy"));
        assert_eq!(connection.ssh_key.as_deref(), Some("~/.ssh/id_ed25519"));
        assert_eq!(connection.port, None);
    }
}
