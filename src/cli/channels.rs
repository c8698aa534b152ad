//! Channel catalog CLI commands.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;

use crate::channels::PreferenceStore;
use crate::config::ChannelCatalog;

/// Channel catalog commands.
#[derive(Subcommand, Debug)]
pub enum ChannelsCommand {
    /// List every channel in delivery order with its effective state.
    List,
    /// Print a channel's effective configuration as JSON.
    Show {
        /// Channel id (e.g., "email", "sms", or a custom id).
        id: String,
    },
    /// Validate the catalog: duplicate ids and preferences for unknown channels.
    Check,
}

/// Run a channels command against `catalog`.
pub fn run_channels_command(
    cmd: &ChannelsCommand,
    catalog: &ChannelCatalog,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let registry = Arc::new(catalog.registry().context("invalid channel catalog")?);

    match cmd {
        ChannelsCommand::List => {
            let store = PreferenceStore::new(Arc::clone(&registry), catalog.preferences.clone());
            writeln!(out, "{:<12} {:<16} {:>8}  STATE", "ID", "TYPE", "PRIORITY")?;
            let rows = registry.all_channels().iter().zip(store.effective_configs());
            for (channel, (_, effective)) in rows {
                writeln!(
                    out,
                    "{:<12} {:<16} {:>8}  {}",
                    channel.id,
                    channel.display_type.to_string(),
                    channel.priority,
                    if effective.enabled { "enabled" } else { "disabled" }
                )?;
            }
        }
        ChannelsCommand::Show { id } => {
            let store = PreferenceStore::new(Arc::clone(&registry), catalog.preferences.clone());
            let effective = store.effective_config(id)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&effective)?)?;
        }
        ChannelsCommand::Check => {
            let unknown = catalog.unknown_preference_ids(&registry);
            if unknown.is_empty() {
                writeln!(out, "Catalog OK: {} channels", registry.len())?;
            } else {
                for id in &unknown {
                    writeln!(out, "warning: preference for unknown channel '{}'", id)?;
                }
                anyhow::bail!("{} preference(s) reference unknown channels", unknown.len());
            }
        }
    }
    Ok(())
}
