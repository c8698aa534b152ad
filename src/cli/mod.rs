//! CLI command handling.
//!
//! Provides subcommands for:
//! - Inspecting the channel catalog (`channels list`, `channels show`)
//! - Validating a catalog file (`channels check`)
//! - Printing the runtime configuration read from the environment (`config`)

mod channels;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::{ChannelCatalog, CourierConfig};

pub use channels::{ChannelsCommand, run_channels_command};

/// Courier operator CLI.
#[derive(Parser, Debug)]
#[command(
    name = "courier",
    version,
    about = "Inspect notification channels and delivery configuration"
)]
pub struct Cli {
    /// Catalog file with custom channels and stored preferences (.json, .json5, .yaml).
    #[arg(long, global = true, env = "COURIER_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Channel catalog commands.
    #[command(subcommand)]
    Channels(ChannelsCommand),
    /// Print the runtime configuration resolved from the environment.
    Config,
}

impl Cli {
    /// Load the catalog named by `--catalog`, or an empty one.
    pub fn load_catalog(&self) -> anyhow::Result<ChannelCatalog> {
        match &self.catalog {
            Some(path) => ChannelCatalog::load(path)
                .with_context(|| format!("failed to load catalog {}", path.display())),
            None => Ok(ChannelCatalog::default()),
        }
    }
}

/// Run the parsed command, writing its output to `out`.
pub fn run(cli: &Cli, out: &mut impl Write) -> anyhow::Result<()> {
    match &cli.command {
        Command::Channels(cmd) => {
            let catalog = cli.load_catalog()?;
            run_channels_command(cmd, &catalog, out)
        }
        Command::Config => {
            let config = CourierConfig::from_env().context("invalid environment configuration")?;
            writeln!(out, "{}", serde_json::to_string_pretty(&config)?)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channels_show() {
        let cli = Cli::try_parse_from(["courier", "channels", "show", "email"]).unwrap();
        assert!(cli.catalog.is_none());
        assert!(matches!(
            cli.command,
            Command::Channels(ChannelsCommand::Show { ref id }) if id == "email"
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "courier",
            "channels",
            "list",
            "--catalog",
            "catalog.yaml",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.catalog, Some(PathBuf::from("catalog.yaml")));
        assert!(cli.json_logs);
    }

    #[test]
    fn test_missing_catalog_file_has_context() {
        let cli = Cli::try_parse_from([
            "courier",
            "--catalog",
            "/nonexistent/catalog.json",
            "channels",
            "list",
        ])
        .unwrap();
        let err = cli.load_catalog().unwrap_err();
        assert!(format!("{:#}", err).contains("failed to load catalog"));
    }
}
