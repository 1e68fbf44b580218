use {
    rgbot_common::types::{ChannelType, InboundEvent},
    serde::{Deserialize, Serialize},
};

/// Address of a persisted route: `(channel, account_id, conversation_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteKey {
    pub channel: ChannelType,
    pub account_id: String,
    pub conversation_key: String,
}

impl RouteKey {
    pub fn new(
        channel: ChannelType,
        account_id: impl Into<String>,
        conversation_key: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            account_id: account_id.into(),
            conversation_key: conversation_key.into(),
        }
    }

    pub fn from_event(event: &InboundEvent) -> Self {
        Self::new(event.channel, &event.account_id, &event.conversation_key)
    }

    /// File-system safe name: every byte outside `[A-Za-z0-9._-]` is
    /// percent-encoded, so distinct keys never share a file.
    pub fn file_stem(&self) -> String {
        let raw = format!(
            "{}:{}:{}",
            self.channel, self.account_id, self.conversation_key
        );
        let mut out = String::with_capacity(raw.len());
        for byte in raw.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
                out.push(byte as char);
            } else {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
        out
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.channel, self.account_id, self.conversation_key
        )
    }
}

/// Where outbound replies for a conversation go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTarget {
    pub channel: ChannelType,
    pub account_id: String,
    /// Chat/peer ID to send to.
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Persisted route record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRoute {
    pub channel: ChannelType,
    pub account_id: String,
    pub conversation_key: String,
    pub last_route_target: RouteTarget,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub updated_at: u64,
}

impl SessionRoute {
    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.channel, &self.account_id, &self.conversation_key)
    }
}
