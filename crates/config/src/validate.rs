//! Configuration validation engine.
//!
//! Detects unknown/misspelled fields, unknown channel names, and values the
//! runtime would clamp or reject.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use rgbot_common::types::ChannelType;

use crate::{
    env_subst::substitute_env,
    schema::{ChannelConfig, DmPolicy, GroupAccess, GroupConfig, HumanDelayConfig, RgbotConfig},
};

/// Inclusive bounds the debouncer clamps `debounce_ms` into.
pub const DEBOUNCE_MS_RANGE: (u64, u64) = (1, 300_000);

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "unknown-channel", "type-error",
    /// "range", "access", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "channels.discord.dm_policy"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// A map with dynamic keys whose values have a known shape.
    Map(Box<KnownKeys>),
    Array(Box<KnownKeys>),
    Leaf,
}

/// Group entries nest (guild → channel); two levels are checked, deeper
/// entries are only type-checked.
fn group_entry(depth: usize) -> KnownKeys {
    use KnownKeys::{Array, Leaf, Map, Struct};

    let sender_rule = Struct(HashMap::from([
        ("sender", Leaf),
        ("allow", Leaf),
        ("deny", Leaf),
    ]));
    let nested = if depth == 0 {
        Leaf
    } else {
        Map(Box::new(group_entry(depth - 1)))
    };
    Struct(HashMap::from([
        ("require_mention", Leaf),
        ("slug", Leaf),
        ("tools", Struct(HashMap::from([("allow", Leaf), ("deny", Leaf)]))),
        ("tools_by_sender", Array(Box::new(sender_rule))),
        ("users", Leaf),
        ("channels", nested),
    ]))
}

/// Build the full schema map mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    let account = Struct(HashMap::from([
        ("enabled", Leaf),
        ("name", Leaf),
        ("token", Leaf),
        ("allow_from", Leaf),
        ("require_mention", Leaf),
        ("text_chunk_limit", Leaf),
        ("chunk_mode", Leaf),
        ("markdown_tables", Leaf),
        ("groups", Map(Box::new(group_entry(1)))),
    ]));

    let channel = Struct(HashMap::from([
        ("enabled", Leaf),
        ("dm_policy", Leaf),
        ("allow_from", Leaf),
        ("group_access", Leaf),
        ("group_allowlist", Leaf),
        ("require_mention", Leaf),
        ("text_chunk_limit", Leaf),
        ("chunk_mode", Leaf),
        ("markdown_tables", Leaf),
        ("typing", Leaf),
        ("groups", Map(Box::new(group_entry(1)))),
        ("accounts", Map(Box::new(account))),
    ]));

    Struct(HashMap::from([
        (
            "agent",
            Struct(HashMap::from([
                ("name", Leaf),
                ("mention_aliases", Leaf),
                ("mention_patterns", Leaf),
                ("timeout_secs", Leaf),
            ])),
        ),
        (
            "messages",
            Struct(HashMap::from([
                (
                    "inbound",
                    Struct(HashMap::from([("debounce_ms", Leaf), ("by_channel", Leaf)])),
                ),
                (
                    "human_delay",
                    Struct(HashMap::from([
                        ("mode", Leaf),
                        ("min_ms", Leaf),
                        ("max_ms", Leaf),
                    ])),
                ),
                ("typing", Leaf),
                ("typing_interval_secs", Leaf),
                (
                    "retry",
                    Struct(HashMap::from([
                        ("attempts", Leaf),
                        ("base_delay_ms", Leaf),
                        ("max_delay_ms", Leaf),
                    ])),
                ),
                ("unauthorized_reply", Leaf),
            ])),
        ),
        (
            "commands",
            Struct(HashMap::from([
                ("text", Leaf),
                ("use_access_groups", Leaf),
                ("mode_when_access_groups_off", Leaf),
                ("allow_from", Leaf),
            ])),
        ),
        (
            "envelope",
            Struct(HashMap::from([
                ("timezone", Leaf),
                ("include_timestamp", Leaf),
            ])),
        ),
        (
            "session",
            Struct(HashMap::from([("store", Leaf), ("path", Leaf)])),
        ),
        ("channels", Map(Box::new(channel))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let content = match std::fs::read_to_string(actual_path) {
        Ok(content) => substitute_env(&content),
        Err(e) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic {
                    severity: Severity::Error,
                    category: "syntax",
                    path: String::new(),
                    message: format!("failed to read config file: {e}"),
                }],
                config_path: Some(actual_path.clone()),
            };
        },
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|e| e == "toml");
    let mut result = if is_toml {
        validate_toml_str(&content)
    } else {
        validate_parsed(crate::loader::parse_config(&content, actual_path))
    };
    result.config_path = Some(actual_path.clone());
    result
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Channel names, before the field walk so typos get a channel hint
    if let Some(channels) = toml_value.get("channels").and_then(|v| v.as_table()) {
        check_channel_names(channels, &mut diagnostics);
    }

    // 3. Unknown fields
    let schema = build_schema_map();
    check_unknown_fields(&toml_value, &schema, "", &mut diagnostics);

    // 4. Type check and semantic checks
    match toml::from_str::<RgbotConfig>(toml_str) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        // Unknown channel keys already produced a better diagnostic.
        Err(_) if diagnostics.iter().any(|d| d.category == "unknown-channel") => {},
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Semantic checks for a config parsed from YAML or JSON.
fn validate_parsed(parsed: crate::Result<RgbotConfig>) -> ValidationResult {
    let mut diagnostics = Vec::new();
    match parsed {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: e.to_string(),
        }),
    }
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Walk the TOML value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (value, schema) {
        (toml::Value::Table(table), KnownKeys::Struct(fields)) => {
            let known_keys: Vec<&str> = fields.keys().copied().collect();
            for (key, child_value) in table {
                let path = join_path(prefix, key);
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child_value, child_schema, &path, diagnostics);
                    continue;
                }
                let level = if prefix.is_empty() {
                    "at top level "
                } else {
                    ""
                };
                let msg = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
                    None => format!("unknown field {level}"),
                };
                diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    category: "unknown-field",
                    path,
                    message: msg.trim().to_string(),
                });
            }
        },
        (toml::Value::Table(table), KnownKeys::Map(value_schema)) => {
            for (key, child_value) in table {
                let path = join_path(prefix, key);
                check_unknown_fields(child_value, value_schema, &path, diagnostics);
            }
        },
        (toml::Value::Array(arr), KnownKeys::Array(item_schema)) => {
            for (i, item) in arr.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                check_unknown_fields(item, item_schema, &path, diagnostics);
            }
        },
        // Leaf or type mismatch, caught by the type check.
        _ => {},
    }
}

fn check_channel_names(
    channels: &toml::map::Map<String, toml::Value>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let known: Vec<&str> = ChannelType::ALL.iter().map(|c| c.as_str()).collect();
    for name in channels.keys() {
        if known.contains(&name.as_str()) {
            continue;
        }
        let msg = match suggest(name, &known, 3) {
            Some(s) => format!("unknown channel (did you mean \"{s}\"?)"),
            None => format!("unknown channel (expected one of: {})", known.join(", ")),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-channel",
            path: format!("channels.{name}"),
            message: msg,
        });
    }
}

fn push(
    diagnostics: &mut Vec<Diagnostic>,
    severity: Severity,
    category: &'static str,
    path: impl Into<String>,
    message: impl Into<String>,
) {
    diagnostics.push(Diagnostic {
        severity,
        category,
        path: path.into(),
        message: message.into(),
    });
}

fn check_debounce(path: String, value: u64, diagnostics: &mut Vec<Diagnostic>) {
    let (min, max) = DEBOUNCE_MS_RANGE;
    if !(min..=max).contains(&value) {
        push(
            diagnostics,
            Severity::Warning,
            "range",
            path,
            format!("{value} is outside {min}..={max} and will be clamped"),
        );
    }
}

/// Run semantic checks on a successfully parsed config.
fn check_semantics(config: &RgbotConfig, diagnostics: &mut Vec<Diagnostic>) {
    let messages = &config.messages;
    check_debounce(
        "messages.inbound.debounce_ms".into(),
        messages.inbound.debounce_ms,
        diagnostics,
    );
    for (channel, ms) in &messages.inbound.by_channel {
        check_debounce(
            format!("messages.inbound.by_channel.{channel}"),
            *ms,
            diagnostics,
        );
    }

    if let HumanDelayConfig::Custom { min_ms, max_ms } = messages.human_delay
        && min_ms > max_ms
    {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "messages.human_delay",
            format!("min_ms ({min_ms}) is greater than max_ms ({max_ms})"),
        );
    }

    if messages.typing && messages.typing_interval_secs == 0 {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "messages.typing_interval_secs",
            "must be at least 1 while typing indicators are enabled",
        );
    }

    if messages.retry.attempts == 0 {
        push(
            diagnostics,
            Severity::Error,
            "range",
            "messages.retry.attempts",
            "must be at least 1",
        );
    }
    if messages.retry.base_delay_ms > messages.retry.max_delay_ms {
        push(
            diagnostics,
            Severity::Warning,
            "range",
            "messages.retry",
            "base_delay_ms exceeds max_delay_ms; every retry waits max_delay_ms",
        );
    }

    if config.agent.timeout_secs == 0 {
        push(
            diagnostics,
            Severity::Info,
            "range",
            "agent.timeout_secs",
            "agent replies are not time-limited",
        );
    }

    for (i, pattern) in config.agent.mention_patterns.iter().enumerate() {
        if let Err(e) = regex::Regex::new(pattern) {
            push(
                diagnostics,
                Severity::Warning,
                "type-error",
                format!("agent.mention_patterns[{i}]"),
                format!("invalid regex, pattern will be ignored: {e}"),
            );
        }
    }

    let tz = config.envelope.timezone.as_str();
    if !tz.eq_ignore_ascii_case("utc")
        && !tz.eq_ignore_ascii_case("local")
        && tz.parse::<chrono_tz::Tz>().is_err()
    {
        push(
            diagnostics,
            Severity::Error,
            "type-error",
            "envelope.timezone",
            format!("unknown timezone \"{tz}\""),
        );
    }

    let mut channels: Vec<_> = config.channels.iter().collect();
    channels.sort_by_key(|(c, _)| **c);
    for (channel, cfg) in channels {
        check_channel(*channel, cfg, diagnostics);
    }
}

/// Check one channel's settings. Errors here keep that channel from
/// starting; other channels are unaffected.
pub fn validate_channel(channel: ChannelType, config: &ChannelConfig) -> crate::Result<()> {
    let mut diagnostics = Vec::new();
    check_channel(channel, config, &mut diagnostics);
    match diagnostics
        .into_iter()
        .find(|d| d.severity == Severity::Error)
    {
        Some(d) => Err(crate::Error::invalid(d.path, d.message)),
        None => Ok(()),
    }
}

fn check_channel(channel: ChannelType, cfg: &ChannelConfig, diagnostics: &mut Vec<Diagnostic>) {
    let base = format!("channels.{channel}");
    if !cfg.enabled {
        return;
    }
    if cfg.dm_policy == DmPolicy::Allowlist
        && cfg.allow_from.is_empty()
        && cfg
            .accounts
            .values()
            .all(|a| a.allow_from.as_ref().is_none_or(Vec::is_empty))
    {
        push(
            diagnostics,
            Severity::Warning,
            "access",
            format!("{base}.dm_policy"),
            "allowlist policy with an empty allow_from rejects every DM",
        );
    }
    if cfg.group_access == GroupAccess::Allowlist
        && cfg.group_allowlist.is_empty()
        && cfg.groups.is_empty()
    {
        push(
            diagnostics,
            Severity::Warning,
            "access",
            format!("{base}.group_access"),
            "allowlist policy with no group_allowlist or groups rejects every group",
        );
    }
    let limits = std::iter::once((base.clone(), cfg.text_chunk_limit)).chain(
        cfg.accounts.iter().map(|(id, a)| {
            (format!("{base}.accounts.{id}"), a.text_chunk_limit)
        }),
    );
    for (path, limit) in limits {
        if limit == Some(0) {
            push(
                diagnostics,
                Severity::Error,
                "range",
                format!("{path}.text_chunk_limit"),
                "must be greater than 0",
            );
        }
    }
    check_groups(&cfg.groups, &format!("{base}.groups"), diagnostics);
}

fn check_groups(
    groups: &HashMap<String, GroupConfig>,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (key, group) in groups {
        let path = format!("{prefix}.{key}");
        for (i, rule) in group.tools_by_sender.iter().enumerate() {
            if rule.sender.trim().is_empty() {
                push(
                    diagnostics,
                    Severity::Error,
                    "type-error",
                    format!("{path}.tools_by_sender[{i}].sender"),
                    "sender must not be empty",
                );
            }
        }
        check_groups(&group.channels, &format!("{path}.channels"), diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(result: &ValidationResult) -> Vec<(&'static str, String)> {
        result
            .diagnostics
            .iter()
            .map(|d| (d.category, d.path.clone()))
            .collect()
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abd"), 1);
        assert_eq!(levenshtein("abc", "abcd"), 1);
    }

    #[test]
    fn empty_config_is_valid() {
        let result = validate_toml_str("");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn full_valid_config_no_diagnostics() {
        let toml = r#"
[agent]
name = "rose"
mention_aliases = ["rose"]
mention_patterns = ["\\brg\\b"]
timeout_secs = 120

[messages]
typing = true
typing_interval_secs = 4

[messages.inbound]
debounce_ms = 2000
by_channel = { whatsapp = 4000 }

[messages.human_delay]
mode = "natural"

[commands]
allow_from = ["id:1"]

[envelope]
timezone = "Europe/Berlin"

[session]
store = "sqlite"
path = "/tmp/rgbot.db"

[channels.discord]
dm_policy = "allowlist"
allow_from = ["alice"]
chunk_mode = "markdown"

[channels.discord.groups.guild-1]
require_mention = true

[channels.discord.groups.guild-1.channels.general]
require_mention = false

[[channels.discord.groups.guild-1.tools_by_sender]]
sender = "username:alice"
allow = ["search"]

[channels.whatsapp.accounts.main]
token = "t"
markdown_tables = "bullets"
"#;
        let result = validate_toml_str(toml);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_nested_key_with_suggestion() {
        let result = validate_toml_str("[messages.inbound]\ndebounse_ms = 10\n");
        let d = &result.diagnostics[0];
        assert_eq!(d.category, "unknown-field");
        assert_eq!(d.path, "messages.inbound.debounse_ms");
        assert!(d.message.contains("debounce_ms"));
    }

    #[test]
    fn unknown_channel_suggested() {
        let result = validate_toml_str("[channels.discrod]\nenabled = true\n");
        assert!(result.has_errors());
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-channel")
            .unwrap();
        assert!(d.message.contains("discord"));
        assert!(!categories(&result).iter().any(|(c, _)| *c == "type-error"));
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("[agent\n");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn out_of_range_debounce_warned() {
        let result = validate_toml_str("[messages.inbound]\ndebounce_ms = 0\n");
        assert_eq!(result.count(Severity::Warning), 1);
        assert!(!result.has_errors());
    }

    #[test]
    fn inverted_custom_delay_is_error() {
        let result =
            validate_toml_str("[messages.human_delay]\nmode = \"custom\"\nmin_ms = 9\nmax_ms = 1\n");
        assert!(result.has_errors());
    }

    #[test]
    fn bad_timezone_is_error() {
        let result = validate_toml_str("[envelope]\ntimezone = \"Mars/Olympus\"\n");
        assert_eq!(categories(&result), vec![(
            "type-error",
            "envelope.timezone".to_string()
        )]);
    }

    #[test]
    fn invalid_mention_pattern_warned() {
        let result = validate_toml_str("[agent]\nmention_patterns = [\"(unclosed\"]\n");
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn empty_dm_allowlist_warned() {
        let result = validate_toml_str("[channels.signal]\ndm_policy = \"allowlist\"\n");
        assert_eq!(categories(&result), vec![(
            "access",
            "channels.signal.dm_policy".to_string()
        )]);
    }

    #[test]
    fn zero_chunk_limit_is_error() {
        let result = validate_toml_str("[channels.slack.accounts.a]\ntext_chunk_limit = 0\n");
        assert!(result.has_errors());
        assert_eq!(
            result.diagnostics[0].path,
            "channels.slack.accounts.a.text_chunk_limit"
        );
    }

    #[test]
    fn validates_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgbot.yaml");
        std::fs::write(&path, "messages:\n  retry:\n    attempts: 0\n").unwrap();
        let result = validate(Some(&path));
        assert!(result.has_errors());
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
    }

    /// Every key of `RgbotConfig::default()` must be known to the schema map.
    #[test]
    fn schema_drift_guard() {
        let config = RgbotConfig::default();
        let toml_value = toml::Value::try_from(&config).expect("serialize default config");
        let mut diagnostics = Vec::new();
        check_unknown_fields(&toml_value, &build_schema_map(), "", &mut diagnostics);
        assert!(
            diagnostics.is_empty(),
            "schema map is missing keys present in RgbotConfig::default(): {diagnostics:?}"
        );
    }

    #[test]
    fn suggest_returns_none_for_distant() {
        let candidates = &["agent", "messages", "channels"];
        assert_eq!(suggest("xxxxxxxxx", candidates, 3), None);
        assert_eq!(suggest("chanels", candidates, 3), Some("channels"));
    }

    #[test]
    fn channel_with_zero_chunk_limit_is_rejected() {
        let mut cfg = ChannelConfig::default();
        assert!(validate_channel(ChannelType::Slack, &cfg).is_ok());

        cfg.text_chunk_limit = Some(0);
        let err = validate_channel(ChannelType::Slack, &cfg).unwrap_err();
        assert!(err.to_string().contains("channels.slack.text_chunk_limit"), "{err}");

        cfg.enabled = false;
        assert!(validate_channel(ChannelType::Slack, &cfg).is_ok());
    }

    #[test]
    fn channel_access_warnings_do_not_block_start() {
        let cfg = ChannelConfig {
            dm_policy: DmPolicy::Allowlist,
            ..Default::default()
        };
        assert!(validate_channel(ChannelType::Signal, &cfg).is_ok());
    }
}
