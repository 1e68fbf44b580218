/// Config schema types (agent identity, inbound messages, commands, channels,
/// envelopes, session store).
use std::{collections::HashMap, path::PathBuf};

use {
    rgbot_common::types::ChannelType,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RgbotConfig {
    pub agent: AgentConfig,
    pub messages: MessagesConfig,
    pub commands: CommandsConfig,
    pub envelope: EnvelopeConfig,
    pub session: SessionConfig,
    pub channels: HashMap<ChannelType, ChannelConfig>,
}

impl RgbotConfig {
    pub fn channel(&self, channel: ChannelType) -> Option<&ChannelConfig> {
        self.channels.get(&channel)
    }
}

/// Bot identity as seen by the mention gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    /// Handles the bot answers to in group chats (e.g. `rg`, `rosebot`).
    /// Matched as whole tokens, case-insensitively, with an optional `@`.
    pub mention_aliases: Vec<String>,
    /// Raw regex patterns, matched case-insensitively. Invalid patterns are
    /// skipped with a warning.
    pub mention_patterns: Vec<String>,
    /// Upper bound for one agent reply in seconds. `0` disables the limit.
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "rgbot".into(),
            mention_aliases: Vec::new(),
            mention_patterns: Vec::new(),
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub inbound: InboundConfig,
    pub human_delay: HumanDelayConfig,
    /// Emit typing indicators while the agent is working.
    pub typing: bool,
    /// Typing indicators expire on most platforms; refresh at this interval.
    pub typing_interval_secs: u64,
    pub retry: RetryConfig,
    /// Text sent back when a control command fails authorization.
    pub unauthorized_reply: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            inbound: InboundConfig::default(),
            human_delay: HumanDelayConfig::default(),
            typing: true,
            typing_interval_secs: 4,
            retry: RetryConfig::default(),
            unauthorized_reply: "Sorry, you are not allowed to use that command here.".into(),
        }
    }
}

/// Debounce settings for inbound bursts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    pub debounce_ms: u64,
    pub by_channel: HashMap<ChannelType, u64>,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            by_channel: HashMap::new(),
        }
    }
}

/// Pause inserted between outbound chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum HumanDelayConfig {
    #[default]
    Off,
    /// 800–2500 ms, uniformly random.
    Natural,
    Custom { min_ms: u64, max_ms: u64 },
}

/// Retry budget for the first outbound chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// What to do with command authorization when access groups are disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessGroupsOffMode {
    #[default]
    Allow,
    Deny,
    /// Enforce only the authorizers that are actually configured.
    Configured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Recognize `/command` text messages.
    pub text: bool,
    pub use_access_groups: bool,
    pub mode_when_access_groups_off: AccessGroupsOffMode,
    /// Senders allowed to run control commands on every channel.
    pub allow_from: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            text: true,
            use_access_groups: true,
            mode_when_access_groups_off: AccessGroupsOffMode::default(),
            allow_from: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// IANA timezone name or `utc`.
    pub timezone: String,
    pub include_timestamp: bool,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            timezone: "utc".into(),
            include_timestamp: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    Memory,
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub store: SessionStoreKind,
    /// Directory (json) or database file (sqlite). Defaults under the data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// How outbound replies are split under a channel's length limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkMode {
    /// Split by length, preferring whitespace.
    #[serde(rename = "plain", alias = "length")]
    Plain,
    /// Split at line breaks, packing lines up to the limit; long lines split
    /// at whitespace.
    #[serde(rename = "newline", alias = "by_newline", alias = "byNewline")]
    Newline,
    /// Paragraph-first splitting that never breaks code fences or mentions.
    #[default]
    #[serde(rename = "markdown", alias = "markdown-aware")]
    Markdown,
}

/// Rendering of markdown tables for channels that cannot display them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMode {
    #[default]
    Off,
    Bullets,
    Code,
}

/// DM access policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    /// Anyone can DM the bot.
    #[default]
    Open,
    /// Only senders on `allow_from`.
    Allowlist,
    /// DMs disabled.
    Disabled,
}

/// Group access policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupAccess {
    /// Bot responds in all groups.
    #[default]
    Open,
    /// Only in groups on `group_allowlist` (or with an explicit `groups` entry).
    Allowlist,
    /// Groups disabled.
    Disabled,
}

/// Allowed / denied tool names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

/// Tool policy bound to a sender predicate.
///
/// `sender` is `id:<id>`, `e164:<number>`, `username:<handle>`, `name:<display>`,
/// a bare value matching any of those, or `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderToolRule {
    pub sender: String,
    #[serde(flatten)]
    pub policy: ToolPolicy,
}

/// Per-group settings. Entries may nest (Discord guild → channel).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_mention: Option<bool>,
    /// Alternate lookup name, compared after slug normalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolPolicy>,
    /// Evaluated in declaration order.
    pub tools_by_sender: Vec<SenderToolRule>,
    /// Known members, used for directory listings.
    pub users: Vec<String>,
    pub channels: HashMap<String, GroupConfig>,
}

/// Channel-wide settings; `accounts` entries override them per account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub dm_policy: DmPolicy,
    pub allow_from: Vec<String>,
    pub group_access: GroupAccess,
    pub group_allowlist: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_mention: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_chunk_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_mode: Option<ChunkMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_tables: Option<TableMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typing: Option<bool>,
    pub groups: HashMap<String, GroupConfig>,
    pub accounts: HashMap<String, AccountConfig>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dm_policy: DmPolicy::default(),
            allow_from: Vec::new(),
            group_access: GroupAccess::default(),
            group_allowlist: Vec::new(),
            require_mention: None,
            text_chunk_limit: None,
            chunk_mode: None,
            markdown_tables: None,
            typing: None,
            groups: HashMap::new(),
            accounts: HashMap::new(),
        }
    }
}

impl ChannelConfig {
    pub fn account(&self, account_id: &str) -> Option<&AccountConfig> {
        self.accounts.get(account_id)
    }

    /// Account IDs to start; a channel without explicit accounts runs `default`.
    pub fn account_ids(&self) -> Vec<String> {
        if self.accounts.is_empty() {
            return vec![DEFAULT_ACCOUNT_ID.to_string()];
        }
        let mut ids: Vec<String> = self
            .accounts
            .iter()
            .filter(|(_, a)| a.enabled)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Account-level allowlist if set, else the channel-level one.
    pub fn allow_from_for(&self, account_id: &str) -> &[String] {
        self.account(account_id)
            .and_then(|a| a.allow_from.as_deref())
            .unwrap_or(&self.allow_from)
    }

    /// Account-level group table if set, else the channel-level one.
    pub fn groups_for(&self, account_id: &str) -> &HashMap<String, GroupConfig> {
        self.account(account_id)
            .and_then(|a| a.groups.as_ref())
            .unwrap_or(&self.groups)
    }

    pub fn chunk_mode_for(&self, account_id: &str) -> Option<ChunkMode> {
        self.account(account_id)
            .and_then(|a| a.chunk_mode)
            .or(self.chunk_mode)
    }

    pub fn text_chunk_limit_for(&self, account_id: &str) -> Option<usize> {
        self.account(account_id)
            .and_then(|a| a.text_chunk_limit)
            .or(self.text_chunk_limit)
    }

    pub fn markdown_tables_for(&self, account_id: &str) -> Option<TableMode> {
        self.account(account_id)
            .and_then(|a| a.markdown_tables)
            .or(self.markdown_tables)
    }

    pub fn require_mention_for(&self, account_id: &str) -> Option<bool> {
        self.account(account_id)
            .and_then(|a| a.require_mention)
            .or(self.require_mention)
    }
}

pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Configuration for a single bot account on a channel.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Platform credential, handed to the channel adapter untouched.
    #[serde(
        serialize_with = "serialize_opt_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_from: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_mention: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_chunk_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_mode: Option<ChunkMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_tables: Option<TableMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<HashMap<String, GroupConfig>>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: None,
            token: None,
            allow_from: None,
            require_mention: None,
            text_chunk_limit: None,
            chunk_mode: None,
            markdown_tables: None,
            groups: None,
        }
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("enabled", &self.enabled)
            .field("name", &self.name)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("allow_from", &self.allow_from)
            .finish_non_exhaustive()
    }
}

fn serialize_opt_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
