//! Command-line interface.

mod commands;

use clap::{Parser, Subcommand};

/// Client and network inventory admin service
#[derive(Parser)]
#[command(name = "inventory-admin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn load_config(&self) -> anyhow::Result<crate::config::Config> {
        match self.config.as_deref() {
            Some(path) => crate::config::Config::load_from(path),
            None => crate::config::Config::load(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server (default)
    #[command(alias = "daemon")]
    Serve,

    /// Create an operator account
    CreateUser {
        #[arg(long)]
        username: String,
        /// Read from the environment when omitted
        #[arg(long, env = "INVENTORY_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },

    /// Print a fresh field encryption key (hex)
    GenerateKey,

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Write a default config file
    Init {
        #[arg(long, default_value = "config.toml")]
        path: std::path::PathBuf,
    },
}

pub use commands::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::parse_from(["inventory-admin"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["inventory-admin", "daemon", "--config", "/etc/inv.toml"]);
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(
            cli.config.as_deref(),
            Some(std::path::Path::new("/etc/inv.toml"))
        );
    }

    #[test]
    fn test_create_user_args() {
        let cli = Cli::parse_from([
            "inventory-admin",
            "create-user",
            "--username",
            "ops",
            "--password",
            "long enough",
            "--admin",
        ]);
        match cli.command {
            Some(Commands::CreateUser {
                username,
                password,
                admin,
            }) => {
                assert_eq!(username, "ops");
                assert_eq!(password, "long enough");
                assert!(admin);
            }
            _ => panic!("expected create-user"),
        }
    }
}
