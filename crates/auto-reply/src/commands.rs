//! Text control commands (`/new`, `/status`, ...).
//!
//! Only the slash form is recognized. Telegram's `/cmd@botname` suffix is
//! accepted; `!cmd` is ordinary text.

use rgbot_config::CommandsConfig;

/// Commands handled by the gateway rather than the agent.
pub const CONTROL_COMMANDS: &[&str] = &[
    "new",
    "reset",
    "stop",
    "status",
    "help",
    "model",
    "think",
    "verbose",
    "compact",
    "context",
    "restart",
    "activation",
    "usage",
    "whoami",
];

/// A parsed control command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    /// Canonical lowercase name from [`CONTROL_COMMANDS`].
    pub name: &'static str,
    /// `@botname` suffix, if the Telegram form was used.
    pub addressed_to: Option<String>,
    /// Everything after the command token, trimmed.
    pub args: String,
}

impl ControlCommand {
    /// Parse a message whose first non-mention token is a control command.
    ///
    /// Leading `@handle` / `<@id>` mentions are skipped, so `@bot /status`
    /// parses as `/status`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut rest = text.trim_start();
        loop {
            let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let token = &rest[..token_end];
            if token.starts_with('@') || (token.starts_with("<@") && token.ends_with('>')) {
                rest = rest[token_end..].trim_start();
                continue;
            }
            break;
        }
        Self::parse_leading(rest)
    }

    /// Parse only when the command is the very first token.
    fn parse_leading(text: &str) -> Option<Self> {
        let body = text.trim_start().strip_prefix('/')?;
        let token_end = body.find(char::is_whitespace).unwrap_or(body.len());
        let (token, args) = body.split_at(token_end);
        let (name, addressed_to) = match token.split_once('@') {
            Some((name, bot)) if !bot.is_empty() => (name, Some(bot.to_string())),
            Some(_) => return None,
            None => (token, None),
        };
        let name = name.to_ascii_lowercase();
        let name = CONTROL_COMMANDS.iter().copied().find(|c| *c == name)?;
        Some(Self {
            name,
            addressed_to,
            args: args.trim().to_string(),
        })
    }

    /// Whether the command targets `bot_name`. Commands without an `@` suffix
    /// target every bot in the chat.
    pub fn is_addressed_to(&self, bot_name: &str) -> bool {
        self.addressed_to
            .as_deref()
            .is_none_or(|target| target.eq_ignore_ascii_case(bot_name.trim_start_matches('@')))
    }

    /// Whether the command targets any of `handles`. Commands without an
    /// `@` suffix target every bot in the chat.
    pub fn is_addressed_to_any(&self, handles: &[String]) -> bool {
        self.addressed_to.is_none() || handles.iter().any(|h| self.is_addressed_to(h))
    }
}

/// Whether `text` carries a control command, possibly after leading mentions.
pub fn has_control_command(text: &str) -> bool {
    ControlCommand::parse(text).is_some()
}

/// Whether the whole message is a control command invocation: it starts with
/// the command and nothing precedes it. Such messages bypass the mention
/// requirement in groups.
pub fn is_control_command_message(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('/') && ControlCommand::parse_leading(trimmed).is_some()
}

/// Text commands are honored at all.
pub fn should_handle_text_commands(config: &CommandsConfig) -> bool {
    config.text
}

/// Authorization is only worth computing for messages carrying a command
/// that will be honored.
pub fn should_compute_command_authorized(text: &str, config: &CommandsConfig) -> bool {
    should_handle_text_commands(config) && has_control_command(text)
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("/status", true)]
    #[case("  /STATUS please", true)]
    #[case("/status@rgbot", true)]
    #[case("@rgbot /new", true)]
    #[case("<@123> /reset", true)]
    #[case("!status", false)]
    #[case("/unknown", false)]
    #[case("/status@", false)]
    #[case("status", false)]
    #[case("please /status", false)]
    #[case("", false)]
    fn detects_control_commands(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(has_control_command(text), expected);
    }

    #[rstest]
    #[case("/help", true)]
    #[case("/help me out", true)]
    #[case("@rgbot /help", false)]
    #[case("hi /help", false)]
    fn command_message_must_lead(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_control_command_message(text), expected);
    }

    #[test]
    fn parse_extracts_name_suffix_and_args() {
        let cmd = ControlCommand::parse("/Model@RgBot  gpt-5 fast ").unwrap();
        assert_eq!(cmd.name, "model");
        assert_eq!(cmd.addressed_to.as_deref(), Some("RgBot"));
        assert_eq!(cmd.args, "gpt-5 fast");
        assert!(cmd.is_addressed_to("rgbot"));
        assert!(cmd.is_addressed_to("@rgbot"));
        assert!(!cmd.is_addressed_to("otherbot"));

        let bare = ControlCommand::parse("/stop").unwrap();
        assert!(bare.is_addressed_to("anyone"));
        assert!(bare.is_addressed_to_any(&[]));

        let handles = vec!["rg".to_string(), "rgbot".to_string()];
        assert!(cmd.is_addressed_to_any(&handles));
        let other = ControlCommand::parse("/reset@otherbot").unwrap();
        assert!(!other.is_addressed_to_any(&handles));
    }

    #[test]
    fn authorization_only_when_text_commands_enabled() {
        let mut config = CommandsConfig::default();
        assert!(should_compute_command_authorized("/status", &config));
        assert!(!should_compute_command_authorized("hello", &config));

        config.text = false;
        assert!(!should_handle_text_commands(&config));
        assert!(!should_compute_command_authorized("/status", &config));
    }
}
