//! Mention/command gate: should the bot respond to this envelope at all?

use {
    regex::Regex,
    rgbot_channels::{
        CommandAuthorizer, GroupPolicy, dm_allowed, resolve_command_authorized_from_authorizers,
    },
    rgbot_config::{CommandsConfig, DmPolicy, ToolPolicy},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use rgbot_metrics::{counter, gate as gate_metrics, labels};

use crate::{
    commands::{ControlCommand, is_control_command_message, should_compute_command_authorized},
    envelope::AgentEnvelope,
    mentions::matches_mention_with_explicit,
};

/// Everything besides the envelope and group policy the gate consults.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub mention_regexes: &'a [Regex],
    /// The bot's own handles; `/cmd@other` commands are not ours.
    pub bot_handles: &'a [String],
    pub commands: &'a CommandsConfig,
    pub dm_policy: DmPolicy,
    /// Effective DM allowlist for the account.
    pub dm_allow_from: &'a [String],
    /// Authorizers from the channel capability plus the global command
    /// allowlist.
    pub authorizers: &'a [CommandAuthorizer],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// No control command, or text commands are disabled.
    NotCommand,
    Authorized,
    /// Surfaced to the sender as a refusal.
    Unauthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    DirectMessage,
    DmDenied,
    GroupDenied,
    MentionNotRequired,
    Mentioned,
    ControlCommand,
    MentionRequired,
}

impl GateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectMessage => "direct_message",
            Self::DmDenied => "dm_denied",
            Self::GroupDenied => "group_denied",
            Self::MentionNotRequired => "mention_not_required",
            Self::Mentioned => "mentioned",
            Self::ControlCommand => "control_command",
            Self::MentionRequired => "mention_required",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub respond: bool,
    /// True only for a control command whose sender passed authorization.
    pub authorized_command: bool,
    pub command: CommandStatus,
    /// Name of the detected control command, if any.
    pub command_name: Option<&'static str>,
    pub reason: GateReason,
    /// Tool policy for the sender; explicit sender rules beat group defaults.
    pub tools: Option<ToolPolicy>,
}

impl GateDecision {
    /// The sender tried a command they may not run and should be told so.
    pub fn is_unauthorized_command(&self) -> bool {
        self.respond && self.command == CommandStatus::Unauthorized
    }
}

/// Decide whether to respond.
///
/// Direct messages are answered unless the DM policy denies the sender.
/// In groups the bot answers when no mention is required, when it is
/// mentioned, or when the message is a bare control command. Command
/// authorization is computed only for messages that carry one.
pub fn should_respond(
    envelope: &AgentEnvelope,
    policy: &GroupPolicy,
    ctx: &GateContext<'_>,
) -> GateDecision {
    let meta = &envelope.channel_meta;
    let text = envelope.text.as_str();

    let command_name = should_compute_command_authorized(text, ctx.commands)
        .then(|| ControlCommand::parse(text))
        .flatten()
        .filter(|c| c.is_addressed_to_any(ctx.bot_handles))
        .map(|c| c.name);
    let command = match command_name {
        None => CommandStatus::NotCommand,
        Some(_) => {
            let authorized = resolve_command_authorized_from_authorizers(
                ctx.commands.use_access_groups,
                ctx.authorizers,
                ctx.commands.mode_when_access_groups_off,
            );
            if authorized {
                CommandStatus::Authorized
            } else {
                CommandStatus::Unauthorized
            }
        },
    };

    let (respond, reason) = if !meta.chat_type.is_group() {
        if dm_allowed(ctx.dm_policy, &meta.sender, ctx.dm_allow_from) {
            (true, GateReason::DirectMessage)
        } else {
            (false, GateReason::DmDenied)
        }
    } else if !policy.allowed {
        (false, GateReason::GroupDenied)
    } else if !policy.require_mention {
        (true, GateReason::MentionNotRequired)
    } else if matches_mention_with_explicit(text, ctx.mention_regexes, meta.explicit_mention) {
        (true, GateReason::Mentioned)
    } else if command_name.is_some() && is_control_command_message(text) {
        (true, GateReason::ControlCommand)
    } else {
        (false, GateReason::MentionRequired)
    };

    let decision = GateDecision {
        respond,
        authorized_command: command == CommandStatus::Authorized,
        command,
        command_name,
        reason,
        tools: policy.tools_for(&meta.sender).cloned(),
    };

    debug!(
        channel = %meta.channel,
        account_id = %meta.account_id,
        conversation_key = %meta.conversation_key,
        respond,
        reason = reason.as_str(),
        command = ?command,
        "gate decision"
    );
    #[cfg(feature = "metrics")]
    {
        counter!(
            gate_metrics::DECISIONS_TOTAL,
            labels::CHANNEL => meta.channel.as_str(),
            labels::OUTCOME => reason.as_str()
        )
        .increment(1);
        if decision.is_unauthorized_command() {
            counter!(
                gate_metrics::UNAUTHORIZED_COMMANDS_TOTAL,
                labels::CHANNEL => meta.channel.as_str()
            )
            .increment(1);
        }
    }

    decision
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            envelope::{EnvelopeOptions, format},
            mentions::{bot_handles, build_mention_regexes},
        },
        rgbot_common::types::{ChannelType, GroupContext, InboundEvent, SenderIdentity},
        rgbot_config::{AccessGroupsOffMode, AgentConfig, SenderToolRule},
        rstest::rstest,
    };

    fn agent() -> AgentConfig {
        AgentConfig {
            name: "bot".into(),
            ..Default::default()
        }
    }

    fn dm(text: &str) -> AgentEnvelope {
        let event = InboundEvent::new(
            ChannelType::Telegram,
            "default",
            "7",
            SenderIdentity::new("7"),
            text,
        );
        format(&event, &EnvelopeOptions::default())
    }

    fn group(text: &str) -> AgentEnvelope {
        let event = InboundEvent::new(
            ChannelType::Discord,
            "default",
            "42",
            SenderIdentity::new("7"),
            text,
        )
        .in_group(GroupContext {
            id: "42".into(),
            ..Default::default()
        });
        format(&event, &EnvelopeOptions::default())
    }

    struct Fixture {
        regexes: Vec<Regex>,
        handles: Vec<String>,
        commands: CommandsConfig,
        allow_from: Vec<String>,
        authorizers: Vec<CommandAuthorizer>,
        dm_policy: DmPolicy,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                regexes: build_mention_regexes(&agent()),
                handles: bot_handles(&agent()),
                commands: CommandsConfig::default(),
                allow_from: Vec::new(),
                authorizers: vec![CommandAuthorizer {
                    configured: true,
                    allowed: true,
                }],
                dm_policy: DmPolicy::Open,
            }
        }

        fn ctx(&self) -> GateContext<'_> {
            GateContext {
                mention_regexes: &self.regexes,
                bot_handles: &self.handles,
                commands: &self.commands,
                dm_policy: self.dm_policy,
                dm_allow_from: &self.allow_from,
                authorizers: &self.authorizers,
            }
        }
    }

    #[rstest]
    #[case("hello bot", true)]
    #[case("hello boot", false)]
    #[case("@bot ping", true)]
    #[case("robot uprising", false)]
    fn group_requires_token_mention(#[case] text: &str, #[case] respond: bool) {
        let f = Fixture::new();
        let decision = should_respond(&group(text), &GroupPolicy::default(), &f.ctx());
        assert_eq!(decision.respond, respond, "{text:?}");
        assert!(!decision.authorized_command);
    }

    #[test]
    fn mention_not_required_answers_everything() {
        let f = Fixture::new();
        let policy = GroupPolicy {
            require_mention: false,
            ..Default::default()
        };
        let decision = should_respond(&group("anything"), &policy, &f.ctx());
        assert!(decision.respond);
        assert_eq!(decision.reason, GateReason::MentionNotRequired);
    }

    #[test]
    fn denied_group_never_responds() {
        let f = Fixture::new();
        let policy = GroupPolicy {
            allowed: false,
            require_mention: false,
            ..Default::default()
        };
        let decision = should_respond(&group("hello bot"), &policy, &f.ctx());
        assert!(!decision.respond);
        assert_eq!(decision.reason, GateReason::GroupDenied);
    }

    #[test]
    fn explicit_platform_mention_counts() {
        let f = Fixture::new();
        let event = InboundEvent::new(
            ChannelType::Discord,
            "default",
            "42",
            SenderIdentity::new("7"),
            "no handle typed",
        )
        .in_group(GroupContext {
            id: "42".into(),
            ..Default::default()
        })
        .with_explicit_mention(true);
        let env = format(&event, &EnvelopeOptions::default());
        let decision = should_respond(&env, &GroupPolicy::default(), &f.ctx());
        assert_eq!(decision.reason, GateReason::Mentioned);
    }

    #[test]
    fn bare_command_bypasses_mention() {
        let f = Fixture::new();
        let decision = should_respond(&group("/status"), &GroupPolicy::default(), &f.ctx());
        assert!(decision.respond);
        assert!(decision.authorized_command);
        assert_eq!(decision.reason, GateReason::ControlCommand);
        assert_eq!(decision.command_name, Some("status"));
    }

    #[test]
    fn command_after_prose_does_not_bypass() {
        let f = Fixture::new();
        let decision = should_respond(&group("so /status?"), &GroupPolicy::default(), &f.ctx());
        assert!(!decision.respond);
        assert_eq!(decision.command, CommandStatus::NotCommand);
    }

    #[test]
    fn unauthorized_command_is_surfaced() {
        let mut f = Fixture::new();
        f.authorizers = vec![CommandAuthorizer {
            configured: true,
            allowed: false,
        }];
        let decision = should_respond(&group("/reset"), &GroupPolicy::default(), &f.ctx());
        assert!(decision.respond);
        assert!(!decision.authorized_command);
        assert!(decision.is_unauthorized_command());
    }

    #[test]
    fn command_for_another_bot_is_ignored() {
        let mut f = Fixture::new();
        f.authorizers = vec![CommandAuthorizer {
            configured: true,
            allowed: false,
        }];
        let decision = should_respond(
            &group("/reset@otherbot"),
            &GroupPolicy::default(),
            &f.ctx(),
        );
        assert!(!decision.respond);
        assert_eq!(decision.command, CommandStatus::NotCommand);
        assert_eq!(decision.reason, GateReason::MentionRequired);
        assert!(!decision.is_unauthorized_command());

        let ours = should_respond(&group("/reset@Bot"), &GroupPolicy::default(), &f.ctx());
        assert!(ours.respond);
        assert!(ours.is_unauthorized_command());
    }

    #[test]
    fn disabled_text_commands_are_plain_text() {
        let mut f = Fixture::new();
        f.commands.text = false;
        let decision = should_respond(&group("/status"), &GroupPolicy::default(), &f.ctx());
        assert!(!decision.respond);
        assert_eq!(decision.command, CommandStatus::NotCommand);
    }

    #[test]
    fn access_groups_off_allows_everyone() {
        let mut f = Fixture::new();
        f.commands.use_access_groups = false;
        f.commands.mode_when_access_groups_off = AccessGroupsOffMode::Allow;
        f.authorizers.clear();
        let decision = should_respond(&dm("/new"), &GroupPolicy::direct(), &f.ctx());
        assert!(decision.authorized_command);
    }

    #[rstest]
    #[case(DmPolicy::Open, &[], true)]
    #[case(DmPolicy::Disabled, &[], false)]
    #[case(DmPolicy::Allowlist, &["7"], true)]
    #[case(DmPolicy::Allowlist, &["8"], false)]
    #[case(DmPolicy::Allowlist, &[], false)]
    fn direct_messages_follow_dm_policy(
        #[case] policy: DmPolicy,
        #[case] allow: &[&str],
        #[case] respond: bool,
    ) {
        let mut f = Fixture::new();
        f.dm_policy = policy;
        f.allow_from = allow.iter().map(|s| s.to_string()).collect();
        let decision = should_respond(&dm("hi"), &GroupPolicy::direct(), &f.ctx());
        assert_eq!(decision.respond, respond);
    }

    #[test]
    fn sender_tool_rules_override_group_default() {
        let f = Fixture::new();
        let policy = GroupPolicy {
            require_mention: false,
            tools_by_sender: vec![SenderToolRule {
                sender: "id:7".into(),
                policy: ToolPolicy {
                    allow: vec!["search".into()],
                    deny: Vec::new(),
                },
            }],
            fallback_tools: Some(ToolPolicy {
                allow: Vec::new(),
                deny: vec!["*".into()],
            }),
            ..Default::default()
        };
        let decision = should_respond(&group("hi"), &policy, &f.ctx());
        assert_eq!(decision.tools.unwrap().allow, vec!["search".to_string()]);
    }
}
