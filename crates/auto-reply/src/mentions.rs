//! Mention detection for group chats.
//!
//! Aliases are matched as whole tokens: `hello bot` mentions `bot`,
//! `hello robot` and `hello boot` do not. A token boundary is the start or
//! end of the text or any character that is not a letter, digit or `_` in
//! any script.

use {regex::Regex, rgbot_config::AgentConfig, tracing::warn};

/// Regex for one alias: optional leading `@`, token-bounded, case-insensitive.
/// `@` is excluded from the leading boundary so `me@bot.example` is no match.
fn alias_regex(alias: &str) -> Option<Regex> {
    let alias = alias.trim().trim_start_matches('@');
    if alias.is_empty() {
        return None;
    }
    let pattern = format!(
        r"(?i)(?:^|[^\p{{L}}\p{{N}}_@])@?{}(?:$|[^\p{{L}}\p{{N}}_])",
        regex::escape(alias)
    );
    Regex::new(&pattern).ok()
}

/// The bot's name and aliases, lowercased without `@`, deduplicated in
/// declaration order.
pub fn bot_handles(agent: &AgentConfig) -> Vec<String> {
    let mut handles: Vec<String> = Vec::new();
    for alias in std::iter::once(&agent.name).chain(&agent.mention_aliases) {
        let handle = alias.trim().trim_start_matches('@').to_lowercase();
        if !handle.is_empty() && !handles.contains(&handle) {
            handles.push(handle);
        }
    }
    handles
}

/// Build the mention matchers for the bot: its name, every alias, then the
/// raw configured patterns. Invalid patterns are skipped with a warning.
pub fn build_mention_regexes(agent: &AgentConfig) -> Vec<Regex> {
    let mut regexes: Vec<Regex> = bot_handles(agent)
        .iter()
        .filter_map(|handle| alias_regex(handle))
        .collect();

    for pattern in &agent.mention_patterns {
        match Regex::new(&format!("(?i){pattern}")) {
            Ok(re) => regexes.push(re),
            Err(e) => warn!(pattern, error = %e, "skipping invalid mention pattern"),
        }
    }
    regexes
}

pub fn matches_mention_patterns(text: &str, regexes: &[Regex]) -> bool {
    !text.is_empty() && regexes.iter().any(|re| re.is_match(text))
}

/// Combine the platform's own mention signal with text matching. An explicit
/// `Some(true)` wins; `Some(false)` (platform saw no mention entity) still lets
/// the text patterns match, since users often type the handle by hand.
pub fn matches_mention_with_explicit(
    text: &str,
    regexes: &[Regex],
    explicit: Option<bool>,
) -> bool {
    explicit == Some(true) || matches_mention_patterns(text, regexes)
}
