//! CLI subcommands for inspecting channel configuration.

use {
    anyhow::{Result, bail},
    clap::{Args, Subcommand},
    rgbot_channels::{
        DirectoryEntry, DirectoryQuery, list_groups_from_config, list_peers_from_config,
    },
    rgbot_common::types::ChannelType,
    rgbot_config::{DEFAULT_ACCOUNT_ID, RgbotConfig},
    serde_json::json,
};

#[derive(Subcommand)]
pub enum ChannelAction {
    /// List every channel with its configured accounts and access policies.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Users known from a channel's config (allowlists and group members).
    Peers(DirectoryArgs),
    /// Groups with a config entry on a channel.
    Groups(DirectoryArgs),
}

#[derive(Args)]
pub struct DirectoryArgs {
    /// Channel name (discord, whatsapp, slack, telegram, signal, imessage, line).
    channel: ChannelType,
    #[arg(long, default_value = DEFAULT_ACCOUNT_ID)]
    account: String,
    /// Case-insensitive substring filter.
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    limit: Option<usize>,
}

pub fn handle_channels(action: &ChannelAction, config: &RgbotConfig) -> Result<()> {
    match action {
        ChannelAction::List { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(&summary_json(config))?);
            } else {
                for line in summary_lines(config) {
                    println!("{line}");
                }
            }
            Ok(())
        },
        ChannelAction::Peers(args) => {
            print_entries(&directory(config, args, list_peers_from_config)?);
            Ok(())
        },
        ChannelAction::Groups(args) => {
            print_entries(&directory(config, args, list_groups_from_config)?);
            Ok(())
        },
    }
}

type Lister = fn(ChannelType, &rgbot_config::ChannelConfig, &DirectoryQuery<'_>) -> Vec<DirectoryEntry>;

fn directory(config: &RgbotConfig, args: &DirectoryArgs, list: Lister) -> Result<Vec<DirectoryEntry>> {
    let Some(channel_config) = config.channel(args.channel) else {
        bail!("channel {} is not configured", args.channel);
    };
    let query = DirectoryQuery {
        account_id: &args.account,
        query: args.query.as_deref(),
        limit: args.limit,
    };
    Ok(list(args.channel, channel_config, &query))
}

fn print_entries(entries: &[DirectoryEntry]) {
    if entries.is_empty() {
        println!("No entries.");
    }
    for entry in entries {
        println!("{}", entry.id);
    }
}

fn summary_lines(config: &RgbotConfig) -> Vec<String> {
    ChannelType::ALL
        .iter()
        .map(|&channel| match config.channel(channel) {
            None => format!("{:<10} not configured", channel.as_str()),
            Some(cfg) if !cfg.enabled => format!("{:<10} disabled", channel.as_str()),
            Some(cfg) => format!(
                "{:<10} accounts={} dm={:?} groups={:?} require_mention={}",
                channel.as_str(),
                cfg.account_ids().join(","),
                cfg.dm_policy,
                cfg.group_access,
                cfg.require_mention.unwrap_or(true),
            ),
        })
        .collect()
}

fn summary_json(config: &RgbotConfig) -> serde_json::Value {
    let channels: Vec<_> = ChannelType::ALL
        .iter()
        .map(|&channel| match config.channel(channel) {
            None => json!({ "channel": channel, "configured": false }),
            Some(cfg) => json!({
                "channel": channel,
                "configured": true,
                "enabled": cfg.enabled,
                "accounts": cfg.account_ids(),
                "dmPolicy": cfg.dm_policy,
                "groupAccess": cfg.group_access,
            }),
        })
        .collect();
    json!({ "channels": channels })
}
