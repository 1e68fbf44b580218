//! Agent-facing envelope built from one inbound event or a debounced burst.

use {
    chrono::{DateTime, Local, TimeZone, Utc},
    chrono_tz::Tz,
    rgbot_common::types::{
        Attachment, AttachmentKind, ChannelType, ChatType, GroupContext, InboundEvent,
        SenderIdentity,
    },
    rgbot_config::EnvelopeConfig,
    serde::Serialize,
    tracing::warn,
};

use crate::{
    commands::has_control_command,
    markdown::{normalize_dialect, normalize_line_endings},
};

/// Timezone used to render envelope timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeTimezone {
    Utc,
    Local,
    Named(Tz),
}

impl EnvelopeTimezone {
    /// Parse `utc`, `local` or an IANA name. Unknown names fall back to UTC.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "utc" | "z" => Self::Utc,
            "local" => Self::Local,
            _ => match name.trim().parse::<Tz>() {
                Ok(tz) => Self::Named(tz),
                Err(_) => {
                    warn!(timezone = name, "unknown envelope timezone, using UTC");
                    Self::Utc
                },
            },
        }
    }

    /// `YYYY-MM-DD HH:MM <zone>` for a Unix timestamp in milliseconds.
    pub fn format_ms(&self, timestamp_ms: u64) -> Option<String> {
        let utc = DateTime::<Utc>::from_timestamp_millis(i64::try_from(timestamp_ms).ok()?)?;
        Some(match self {
            Self::Utc => utc.format("%Y-%m-%d %H:%M UTC").to_string(),
            Self::Local => Local
                .from_utc_datetime(&utc.naive_utc())
                .format("%Y-%m-%d %H:%M %:z")
                .to_string(),
            Self::Named(tz) => tz
                .from_utc_datetime(&utc.naive_utc())
                .format("%Y-%m-%d %H:%M %Z")
                .to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeOptions {
    pub timezone: EnvelopeTimezone,
    pub include_timestamp: bool,
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            timezone: EnvelopeTimezone::Utc,
            include_timestamp: true,
        }
    }
}

impl From<&EnvelopeConfig> for EnvelopeOptions {
    fn from(config: &EnvelopeConfig) -> Self {
        Self {
            timezone: EnvelopeTimezone::parse(&config.timezone),
            include_timestamp: config.include_timestamp,
        }
    }
}

/// Where a message came from. Taken from the latest event of a burst.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMeta {
    pub channel: ChannelType,
    pub account_id: String,
    pub conversation_key: String,
    pub chat_type: ChatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub sender: SenderIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit_mention: Option<bool>,
    /// Rendered `timestamp`, absent when disabled or unrepresentable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_label: Option<String>,
    /// Number of inbound events merged into this envelope.
    pub burst_size: usize,
}

/// Normalized message handed to the gate and the agent. Never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEnvelope {
    pub text: String,
    pub sender_display: String,
    pub channel_meta: ChannelMeta,
    pub attachment_refs: Vec<Attachment>,
    pub command_flag: bool,
}

/// Display name for a sender: username, then display name, then raw id.
/// Blank fields are skipped; nothing at all yields an empty string.
pub fn sender_display(sender: &SenderIdentity) -> String {
    [sender.username.as_deref(), sender.name.as_deref(), Some(sender.id.as_str())]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn normalize_text(channel: ChannelType, raw: &str) -> String {
    normalize_dialect(channel, &normalize_line_endings(raw))
}

fn meta_for(event: &InboundEvent, options: &EnvelopeOptions, burst_size: usize) -> ChannelMeta {
    let timestamp_label = if options.include_timestamp && event.timestamp > 0 {
        options.timezone.format_ms(event.timestamp)
    } else {
        None
    };
    ChannelMeta {
        channel: event.channel,
        account_id: event.account_id.clone(),
        conversation_key: event.conversation_key.clone(),
        chat_type: event.chat_type,
        group: event.group.clone(),
        thread_id: event.thread_id.clone(),
        sender: event.sender.clone(),
        message_id: event.message_id.clone(),
        timestamp: event.timestamp,
        explicit_mention: event.explicit_mention,
        timestamp_label,
        burst_size,
    }
}

/// Build the envelope for a single event.
pub fn format(event: &InboundEvent, options: &EnvelopeOptions) -> AgentEnvelope {
    let text = normalize_text(event.channel, &event.raw_text);
    AgentEnvelope {
        command_flag: event.is_command || has_control_command(&text),
        sender_display: sender_display(&event.sender),
        channel_meta: meta_for(event, options, 1),
        attachment_refs: event.attachments.clone(),
        text,
    }
}

/// Merge a burst into one envelope: non-empty texts newline-joined in arrival
/// order, metadata and sender from the latest event, attachments concatenated,
/// command flag if any event carries a command. `None` for an empty burst.
pub fn format_burst(events: &[InboundEvent], options: &EnvelopeOptions) -> Option<AgentEnvelope> {
    let latest = events.last()?;
    let texts: Vec<String> = events
        .iter()
        .map(|e| normalize_text(e.channel, &e.raw_text))
        .filter(|t| !t.trim().is_empty())
        .collect();
    let command_flag = events.iter().any(|e| e.is_command)
        || texts.iter().any(|t| has_control_command(t));
    Some(AgentEnvelope {
        text: texts.join("\n"),
        sender_display: sender_display(&latest.sender),
        channel_meta: meta_for(latest, options, events.len()),
        attachment_refs: events
            .iter()
            .flat_map(|e| e.attachments.iter().cloned())
            .collect(),
        command_flag,
    })
}

fn attachment_label(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Image => "image",
        AttachmentKind::Audio => "audio",
        AttachmentKind::Video => "video",
        AttachmentKind::Document => "document",
        AttachmentKind::Other => "file",
    }
}

impl AgentEnvelope {
    /// `[Channel Sender timestamp] text`, followed by one line per attachment.
    pub fn render(&self) -> String {
        let meta = &self.channel_meta;
        let mut header = meta.channel.label().to_string();
        if let Some(group) = &meta.group {
            let name = group.channel_name.as_deref().unwrap_or(&group.id);
            header.push_str(&format!(" #{name}"));
        }
        if !self.sender_display.is_empty() {
            header.push(' ');
            header.push_str(&self.sender_display);
        }
        if let Some(label) = &meta.timestamp_label {
            header.push(' ');
            header.push_str(label);
        }

        let mut out = format!("[{header}] {}", self.text);
        for attachment in &self.attachment_refs {
            let label = attachment_label(attachment.kind);
            match &attachment.filename {
                Some(name) => out.push_str(&format!("\n[{label}: {name}] {}", attachment.url)),
                None => out.push_str(&format!("\n[{label}] {}", attachment.url)),
            }
        }
        out
    }
}
