use {
    rgbot_common::types::{GroupContext, SenderIdentity},
    rgbot_config::{DmPolicy, GroupAccess},
};

use crate::groups::normalize_slug;

/// Check if a peer is allowed to interact with the bot.
///
/// An empty allowlist means everyone is allowed (open policy).
/// Entries are matched case-insensitively against the peer ID.
/// Supports exact match and glob-style `*` wildcards.
pub fn is_allowed(peer_id: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let peer_lower = peer_id.to_lowercase();
    allowlist.iter().any(|pattern| matches_entry(pattern, &peer_lower))
}

/// Like [`is_allowed`] but checks every identity field of the sender.
///
/// Entries may carry an `id:`, `e164:`, `username:`, or `name:` prefix to
/// restrict which field they match; a leading `@` is ignored.
pub fn is_sender_allowed(sender: &SenderIdentity, allowlist: &[String]) -> bool {
    allowlist.is_empty() || allowlist.iter().any(|entry| sender_matches(sender, entry))
}

/// Whether `entry` names this sender. `*` matches everyone.
pub fn sender_matches(sender: &SenderIdentity, entry: &str) -> bool {
    let entry = entry.trim();
    if entry.is_empty() {
        return false;
    }
    if entry == "*" {
        return true;
    }
    let (field, value) = match entry.split_once(':') {
        Some((prefix, value))
            if matches!(
                prefix.to_ascii_lowercase().as_str(),
                "id" | "e164" | "username" | "name"
            ) =>
        {
            (Some(prefix.to_ascii_lowercase()), value.trim())
        },
        _ => (None, entry),
    };
    let value = value.trim_start_matches('@').to_lowercase();
    if value.is_empty() {
        return false;
    }

    let candidates: [(&str, Option<&str>); 4] = [
        ("id", Some(sender.id.as_str())),
        ("e164", sender.e164.as_deref()),
        ("username", sender.username.as_deref()),
        ("name", sender.name.as_deref()),
    ];
    candidates
        .iter()
        .filter(|(name, _)| field.as_deref().is_none_or(|f| f == *name))
        .filter_map(|(_, candidate)| *candidate)
        .any(|candidate| {
            let candidate = candidate.trim_start_matches('@').to_lowercase();
            matches_entry(&value, &candidate)
        })
}

fn matches_entry(pattern: &str, text_lower: &str) -> bool {
    let pat = pattern.to_lowercase();
    if pat.contains('*') {
        glob_match(&pat, text_lower)
    } else {
        pat == text_lower
    }
}

/// Simple glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                // First segment must match at start
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    // Last segment must match at end (unless pattern ends with *)
    if !parts.last().unwrap_or(&"").is_empty() {
        text.ends_with(parts.last().unwrap_or(&""))
    } else {
        true
    }
}

/// DM access decision for a sender.
pub fn dm_allowed(policy: DmPolicy, sender: &SenderIdentity, allow_from: &[String]) -> bool {
    match policy {
        DmPolicy::Open => true,
        DmPolicy::Disabled => false,
        // An allowlist policy with nobody on the list admits nobody.
        DmPolicy::Allowlist => {
            !allow_from.is_empty() && is_sender_allowed(sender, allow_from)
        },
    }
}

/// Group access decision. `has_entry` is true when the group has an explicit
/// (non-wildcard) config entry, which counts as allowlisting it.
pub fn group_allowed(
    access: GroupAccess,
    group: &GroupContext,
    allowlist: &[String],
    has_entry: bool,
) -> bool {
    match access {
        GroupAccess::Open => true,
        GroupAccess::Disabled => false,
        GroupAccess::Allowlist => {
            if has_entry {
                return true;
            }
            let mut names = vec![group.id.to_lowercase()];
            names.extend(group.space.iter().map(|s| s.to_lowercase()));
            names.extend(group.channel_name.iter().map(|c| normalize_slug(c)));
            allowlist.iter().any(|pattern| {
                let slug = normalize_slug(pattern);
                names
                    .iter()
                    .any(|name| matches_entry(pattern, name) || (!slug.is_empty() && *name == slug))
            })
        },
    }
}
