//! Peers and groups known from configuration alone, for target pickers and
//! `channels list`.

use std::{collections::BTreeSet, sync::LazyLock};

use {
    regex::Regex,
    rgbot_common::types::ChannelType,
    rgbot_config::ChannelConfig,
    serde::Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryKind {
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub kind: DirectoryKind,
    pub id: String,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryQuery<'a> {
    pub account_id: &'a str,
    /// Case-insensitive substring filter.
    pub query: Option<&'a str>,
    /// `None` or `0` means unlimited.
    pub limit: Option<usize>,
}

static DISCORD_USER_MENTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^<@!?(\d+)>$").ok());
static DISCORD_CHANNEL_MENTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^<#(\d+)>$").ok());

/// Normalize a Discord id (`<@123>`, `user:123`, `123`) to `<prefix>:<id>`.
fn normalize_discord_id(
    raw: &str,
    mention: &Option<Regex>,
    strip: &[&str],
    prefix: &str,
) -> Option<String> {
    let raw = raw.trim();
    let captured = mention
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str());
    let lower = captured.to_ascii_lowercase();
    let cleaned = strip
        .iter()
        .find_map(|p| lower.strip_prefix(&format!("{p}:")).map(str::to_string))
        .unwrap_or(lower);
    let cleaned = cleaned.trim();
    (!cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()))
        .then(|| format!("{prefix}:{cleaned}"))
}

fn finish(
    ids: impl IntoIterator<Item = String>,
    kind: DirectoryKind,
    params: &DirectoryQuery<'_>,
) -> Vec<DirectoryEntry> {
    let query = params
        .query
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    let limit = params.limit.filter(|l| *l > 0).unwrap_or(usize::MAX);
    let mut seen = BTreeSet::new();
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && id != "*")
        .filter(|id| seen.insert(id.clone()))
        .filter(|id| query.as_deref().is_none_or(|q| id.to_lowercase().contains(q)))
        .take(limit)
        .map(|id| DirectoryEntry { kind, id })
        .collect()
}

/// Users named in the account's allowlist and group member lists.
pub fn list_peers_from_config(
    channel: ChannelType,
    config: &ChannelConfig,
    params: &DirectoryQuery<'_>,
) -> Vec<DirectoryEntry> {
    let mut raw: Vec<String> = config.allow_from_for(params.account_id).to_vec();
    let mut groups: Vec<_> = config.groups_for(params.account_id).iter().collect();
    groups.sort_by(|a, b| a.0.cmp(b.0));
    for (_, group) in groups {
        raw.extend(group.users.iter().cloned());
        let mut channels: Vec<_> = group.channels.iter().collect();
        channels.sort_by(|a, b| a.0.cmp(b.0));
        for (_, nested) in channels {
            raw.extend(nested.users.iter().cloned());
        }
    }

    let ids: Vec<String> = match channel {
        ChannelType::Discord => raw
            .iter()
            .filter(|r| r.trim() != "*")
            .filter_map(|r| {
                normalize_discord_id(r, &DISCORD_USER_MENTION, &["discord", "user"], "user")
            })
            .collect(),
        _ => raw,
    };
    finish(ids, DirectoryKind::User, params)
}

/// Groups with a config entry. For Discord these are the channel IDs nested
/// under guild entries.
pub fn list_groups_from_config(
    channel: ChannelType,
    config: &ChannelConfig,
    params: &DirectoryQuery<'_>,
) -> Vec<DirectoryEntry> {
    let groups = config.groups_for(params.account_id);
    let mut ids: Vec<String> = match channel {
        ChannelType::Discord => groups
            .values()
            .flat_map(|guild| guild.channels.keys())
            .filter_map(|raw| {
                normalize_discord_id(
                    raw,
                    &DISCORD_CHANNEL_MENTION,
                    &["discord", "channel", "group"],
                    "channel",
                )
            })
            .collect(),
        _ => groups.keys().cloned().collect(),
    };
    ids.sort();
    finish(ids, DirectoryKind::Group, params)
}

#[cfg(test)]
mod tests {
    use {super::*, rgbot_config::GroupConfig};

    fn discord_config() -> ChannelConfig {
        let mut guild = GroupConfig {
            users: vec!["<@!111>".into(), "nickname".into()],
            ..Default::default()
        };
        guild.channels.insert("<#900>".into(), GroupConfig {
            users: vec!["user:222".into()],
            ..Default::default()
        });
        guild.channels.insert("channel:901".into(), GroupConfig::default());
        guild.channels.insert("general".into(), GroupConfig::default());
        let mut config = ChannelConfig {
            allow_from: vec!["*".into(), "discord:333".into(), "111".into()],
            ..Default::default()
        };
        config.groups.insert("guild".into(), guild);
        config
    }

    fn ids(entries: &[DirectoryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn discord_peers_normalized_and_deduplicated() {
        let params = DirectoryQuery {
            account_id: "default",
            ..Default::default()
        };
        let peers = list_peers_from_config(ChannelType::Discord, &discord_config(), &params);
        assert_eq!(ids(&peers), vec!["user:333", "user:111", "user:222"]);
        assert!(peers.iter().all(|p| p.kind == DirectoryKind::User));
    }

    #[test]
    fn discord_groups_are_nested_channels() {
        let params = DirectoryQuery {
            account_id: "default",
            ..Default::default()
        };
        let groups = list_groups_from_config(ChannelType::Discord, &discord_config(), &params);
        assert_eq!(ids(&groups), vec!["channel:900", "channel:901"]);
    }

    #[test]
    fn query_and_limit_apply() {
        let mut config = ChannelConfig {
            allow_from: vec!["+15550001".into(), "+15550002".into(), "+4470000".into()],
            ..Default::default()
        };
        config.groups.insert("*".into(), GroupConfig::default());
        config.groups.insert("family@g.us".into(), GroupConfig::default());

        let params = DirectoryQuery {
            account_id: "default",
            query: Some("555"),
            limit: Some(1),
        };
        let peers = list_peers_from_config(ChannelType::WhatsApp, &config, &params);
        assert_eq!(ids(&peers), vec!["+15550001"]);

        let params = DirectoryQuery {
            account_id: "default",
            ..Default::default()
        };
        let groups = list_groups_from_config(ChannelType::WhatsApp, &config, &params);
        assert_eq!(ids(&groups), vec!["family@g.us"]);
    }
}
