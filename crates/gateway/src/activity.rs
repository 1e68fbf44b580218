//! Last inbound/outbound activity per channel account.

use std::sync::Arc;

use {
    dashmap::DashMap,
    rgbot_common::{Clock, SystemClock, types::ChannelType},
    serde::Serialize,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTimestamps {
    /// Milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_inbound_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outbound_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountActivity {
    pub channel: ChannelType,
    pub account_id: String,
    #[serde(flatten)]
    pub timestamps: ActivityTimestamps,
}

pub struct ChannelActivity {
    entries: DashMap<(ChannelType, String), ActivityTimestamps>,
    clock: Arc<dyn Clock>,
}

impl Default for ChannelActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelActivity {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn record_inbound(&self, channel: ChannelType, account_id: &str) {
        let now = self.clock.now_ms();
        let mut entry = self
            .entries
            .entry((channel, account_id.to_string()))
            .or_default();
        entry.last_inbound_at = Some(entry.last_inbound_at.map_or(now, |prev| prev.max(now)));
    }

    pub fn record_outbound(&self, channel: ChannelType, account_id: &str) {
        let now = self.clock.now_ms();
        let mut entry = self
            .entries
            .entry((channel, account_id.to_string()))
            .or_default();
        entry.last_outbound_at = Some(entry.last_outbound_at.map_or(now, |prev| prev.max(now)));
    }

    pub fn get(&self, channel: ChannelType, account_id: &str) -> Option<ActivityTimestamps> {
        self.entries
            .get(&(channel, account_id.to_string()))
            .map(|e| *e.value())
    }

    /// All accounts with activity, ordered by channel then account.
    pub fn snapshot(&self) -> Vec<AccountActivity> {
        let mut out: Vec<AccountActivity> = self
            .entries
            .iter()
            .map(|e| AccountActivity {
                channel: e.key().0,
                account_id: e.key().1.clone(),
                timestamps: *e.value(),
            })
            .collect();
        out.sort_by(|a, b| (a.channel, &a.account_id).cmp(&(b.channel, &b.account_id)));
        out
    }
}
