//! Domain types shared by the inbound pipeline and the channel adapters.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Messaging platforms the gateway can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Discord,
    WhatsApp,
    Slack,
    Telegram,
    Signal,
    IMessage,
    Line,
}

impl ChannelType {
    pub const ALL: &'static [ChannelType] = &[
        Self::Discord,
        Self::WhatsApp,
        Self::Slack,
        Self::Telegram,
        Self::Signal,
        Self::IMessage,
        Self::Line,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::WhatsApp => "whatsapp",
            Self::Slack => "slack",
            Self::Telegram => "telegram",
            Self::Signal => "signal",
            Self::IMessage => "imessage",
            Self::Line => "line",
        }
    }

    /// Human-readable platform name used in envelopes and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Discord => "Discord",
            Self::WhatsApp => "WhatsApp",
            Self::Slack => "Slack",
            Self::Telegram => "Telegram",
            Self::Signal => "Signal",
            Self::IMessage => "iMessage",
            Self::Line => "LINE",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel: {0}")]
pub struct UnknownChannel(pub String);

/// Kind of conversation an inbound message belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    #[default]
    Dm,
    Group,
    Channel,
}

impl ChatType {
    pub fn is_group(&self) -> bool {
        !matches!(self, Self::Dm)
    }
}

/// Who sent an inbound message. Every field except `id` is optional because
/// platforms expose very different identity data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e164: Option<String>,
}

impl SenderIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    Document,
    Other,
}

/// Reference to inbound media. The pipeline never fetches the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Group addressing details for group/channel conversations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupContext {
    /// Platform group/channel ID.
    pub id: String,
    /// Containing space (Discord guild, Slack team).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
    /// Human channel name (e.g. `general`), used for slug lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
}

/// A normalized inbound message pushed by a channel adapter.
///
/// Built once by the adapter and never mutated afterwards; builder methods
/// consume `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub channel: ChannelType,
    pub account_id: String,
    /// Group, peer, or thread ID identifying the conversation.
    pub conversation_key: String,
    pub chat_type: ChatType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub sender: SenderIdentity,
    pub raw_text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default)]
    pub is_command: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Platform-level mention signal (e.g. a Discord mention entity).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_mention: Option<bool>,
}

impl InboundEvent {
    pub fn new(
        channel: ChannelType,
        account_id: impl Into<String>,
        conversation_key: impl Into<String>,
        sender: SenderIdentity,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            account_id: account_id.into(),
            conversation_key: conversation_key.into(),
            chat_type: ChatType::Dm,
            group: None,
            thread_id: None,
            sender,
            raw_text: raw_text.into(),
            attachments: Vec::new(),
            timestamp: 0,
            is_command: false,
            message_id: None,
            explicit_mention: None,
        }
    }

    #[must_use]
    pub fn in_group(mut self, group: GroupContext) -> Self {
        self.chat_type = ChatType::Group;
        self.group = Some(group);
        self
    }

    #[must_use]
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub fn with_command(mut self, is_command: bool) -> Self {
        self.is_command = is_command;
        self
    }

    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_explicit_mention(mut self, mentioned: bool) -> Self {
        self.explicit_mention = Some(mentioned);
        self
    }

    /// Stable key identifying the conversation across channel + account.
    pub fn session_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.channel, self.account_id, self.conversation_key
        )
    }
}
