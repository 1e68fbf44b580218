//! Group policy resolution: which config entry applies to a group, whether
//! the bot needs a mention there, and which tools a sender may use.

use std::collections::HashMap;

use {
    rgbot_common::types::{GroupContext, SenderIdentity},
    rgbot_config::{ChannelConfig, GroupConfig, SenderToolRule, ToolPolicy},
};

use crate::gating::{group_allowed, sender_matches};

/// Snapshot of the policy for one (channel, account, group).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPolicy {
    pub require_mention: bool,
    /// False when `group_access` denies this group.
    pub allowed: bool,
    /// Sender rules, innermost entry first, each entry in declaration order.
    pub tools_by_sender: Vec<SenderToolRule>,
    /// Group-level tool policy, innermost entry first.
    pub fallback_tools: Option<ToolPolicy>,
}

impl Default for GroupPolicy {
    fn default() -> Self {
        Self {
            require_mention: true,
            allowed: true,
            tools_by_sender: Vec::new(),
            fallback_tools: None,
        }
    }
}

impl GroupPolicy {
    /// Policy for direct conversations: no mention needed, no tool limits.
    pub fn direct() -> Self {
        Self {
            require_mention: false,
            ..Default::default()
        }
    }

    /// Tool policy for `sender`.
    ///
    /// An explicit sender rule beats wildcard rules, which beat the group
    /// default. Within each tier the first declared rule wins.
    pub fn tools_for(&self, sender: &SenderIdentity) -> Option<&ToolPolicy> {
        let explicit = self
            .tools_by_sender
            .iter()
            .filter(|rule| rule.sender.trim() != "*")
            .find(|rule| sender_matches(sender, &rule.sender));
        let wildcard = || {
            self.tools_by_sender
                .iter()
                .find(|rule| rule.sender.trim() == "*")
        };
        explicit
            .or_else(wildcard)
            .map(|rule| &rule.policy)
            .or(self.fallback_tools.as_ref())
    }
}

/// Normalize a group/channel name for lookups.
///
/// Lowercases, strips leading `@`/`#`, maps whitespace and `_` to `-`, maps
/// anything outside `[a-z0-9-]` to `-`, then collapses and trims dashes.
pub fn normalize_slug(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let stripped = lower.trim_start_matches(['@', '#']);

    let mut out = String::with_capacity(stripped.len());
    for ch in stripped.chars() {
        let mapped = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '-'
        };
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }
    out.trim_matches('-').to_string()
}

/// Find the entry for `key`: explicit key, slug-normalized key, an entry
/// whose `slug` field matches, then the `*` wildcard.
///
/// The returned flag is true for non-wildcard matches.
fn lookup_entry<'a>(
    entries: &'a HashMap<String, GroupConfig>,
    key: &str,
) -> Option<(&'a GroupConfig, bool)> {
    if entries.is_empty() {
        return None;
    }
    let key = key.trim();
    if !key.is_empty()
        && let Some(entry) = entries.get(key)
    {
        return Some((entry, true));
    }
    let slug = normalize_slug(key);
    if !slug.is_empty() {
        if let Some(entry) = entries.get(&slug) {
            return Some((entry, true));
        }
        // Sorted so the pick is stable when several entries share a slug.
        let mut by_slug: Vec<(&String, &GroupConfig)> = entries
            .iter()
            .filter(|(_, e)| e.slug.as_deref().is_some_and(|s| normalize_slug(s) == slug))
            .collect();
        by_slug.sort_by(|a, b| a.0.cmp(b.0));
        if let Some((_, entry)) = by_slug.first() {
            return Some((entry, true));
        }
    }
    entries.get("*").map(|e| (e, false))
}

/// Nested channel entry under a space entry: by channel ID, then by slug of
/// the channel name (bare or `#`-prefixed).
fn lookup_nested<'a>(
    entries: &'a HashMap<String, GroupConfig>,
    group: &GroupContext,
) -> Option<&'a GroupConfig> {
    if entries.is_empty() {
        return None;
    }
    if let Some(entry) = entries.get(group.id.trim()) {
        return Some(entry);
    }
    let slug = normalize_slug(group.channel_name.as_deref().unwrap_or_default());
    if slug.is_empty() {
        return None;
    }
    entries
        .get(&slug)
        .or_else(|| entries.get(&format!("#{slug}")))
}

/// Resolve the policy for a group conversation on one channel account.
///
/// When the group has a containing space (Discord guild), the top-level
/// entry is looked up by space and its `channels` table by channel; otherwise
/// the top-level entry is looked up by group ID.
pub fn resolve_group_policy(
    config: &ChannelConfig,
    account_id: &str,
    group: &GroupContext,
) -> GroupPolicy {
    let entries = config.groups_for(account_id);
    let outer_key = group.space.as_deref().unwrap_or(&group.id);
    let outer = lookup_entry(entries, outer_key).or_else(|| {
        // A space-scoped group may still be configured by its own ID.
        group
            .space
            .as_ref()
            .and_then(|_| lookup_entry(entries, &group.id))
            .filter(|(_, explicit)| *explicit)
    });
    let inner = match (&group.space, outer) {
        (Some(_), Some((entry, _))) => lookup_nested(&entry.channels, group),
        _ => None,
    };

    let levels: Vec<&GroupConfig> = inner
        .into_iter()
        .chain(outer.map(|(entry, _)| entry))
        .collect();

    let require_mention = levels
        .iter()
        .find_map(|entry| entry.require_mention)
        .or_else(|| config.require_mention_for(account_id))
        .unwrap_or(true);

    let has_entry = inner.is_some() || outer.is_some_and(|(_, explicit)| explicit);
    let allowed = group_allowed(
        config.group_access,
        group,
        &config.group_allowlist,
        has_entry,
    );

    GroupPolicy {
        require_mention,
        allowed,
        tools_by_sender: levels
            .iter()
            .flat_map(|entry| entry.tools_by_sender.iter().cloned())
            .collect(),
        fallback_tools: levels.iter().find_map(|entry| entry.tools.clone()),
    }
}
