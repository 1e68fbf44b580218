//! Identifiers channel providers resolved from their configured allowlists.
//!
//! Filled in at start from `ChannelCapability::resolve_allowlist` and merged
//! into DM gating and command authorization alongside the config entries.

use {dashmap::DashMap, rgbot_common::types::ChannelType};

#[derive(Debug, Default)]
pub struct ResolvedAllowlists {
    entries: DashMap<(ChannelType, String), Vec<String>>,
}

impl ResolvedAllowlists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the resolved list for one account. An empty list removes it.
    pub fn set(&self, channel: ChannelType, account_id: &str, ids: Vec<String>) {
        let key = (channel, account_id.to_string());
        if ids.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, ids);
        }
    }

    pub fn get(&self, channel: ChannelType, account_id: &str) -> Vec<String> {
        self.entries
            .get(&(channel, account_id.to_string()))
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
