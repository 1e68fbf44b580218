//! Inbound pipeline: debounced burst → envelope → gate → dispatch → route
//! commit.

use std::sync::Arc;

use {
    async_trait::async_trait,
    regex::Regex,
    rgbot_auto_reply::{
        AgentRequest, DispatchResult, EnvelopeOptions, FlushHandler, GateContext, GateReason,
        InboundDebouncer, OutboundPlan, ReplyDispatcher, bot_handles, build_mention_regexes,
        format_burst, should_respond,
    },
    rgbot_channels::{
        ChannelRegistry, CommandAuthorizer, GroupPolicy, InboundSink, is_sender_allowed,
        resolve_group_policy,
    },
    rgbot_common::types::{GroupContext, InboundEvent},
    rgbot_config::{ChannelConfig, RgbotConfig},
    rgbot_sessions::{RouteKey, RouteTarget, SessionRecorder},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use rgbot_metrics::{channels as channel_metrics, counter, labels};

use crate::{activity::ChannelActivity, allowlist::ResolvedAllowlists};

/// What happened to one burst.
#[derive(Debug)]
pub enum BurstOutcome {
    /// Nothing to process.
    Empty,
    /// The gate declined to respond.
    Skipped(GateReason),
    /// An unauthorized command was refused in-channel.
    Refused(DispatchResult),
    Replied(DispatchResult),
}

impl BurstOutcome {
    pub fn dispatch_result(&self) -> Option<&DispatchResult> {
        match self {
            Self::Refused(result) | Self::Replied(result) => Some(result),
            Self::Empty | Self::Skipped(_) => None,
        }
    }
}

pub struct InboundPipeline {
    config: Arc<RgbotConfig>,
    registry: Arc<ChannelRegistry>,
    dispatcher: Arc<ReplyDispatcher>,
    recorder: Arc<SessionRecorder>,
    activity: Arc<ChannelActivity>,
    allowlists: Arc<ResolvedAllowlists>,
    mention_regexes: Vec<Regex>,
    bot_handles: Vec<String>,
    envelope_options: EnvelopeOptions,
}

impl InboundPipeline {
    pub fn new(
        config: Arc<RgbotConfig>,
        registry: Arc<ChannelRegistry>,
        dispatcher: Arc<ReplyDispatcher>,
        recorder: Arc<SessionRecorder>,
        activity: Arc<ChannelActivity>,
        allowlists: Arc<ResolvedAllowlists>,
    ) -> Self {
        Self {
            mention_regexes: build_mention_regexes(&config.agent),
            bot_handles: bot_handles(&config.agent),
            envelope_options: EnvelopeOptions::from(&config.envelope),
            config,
            registry,
            dispatcher,
            recorder,
            activity,
            allowlists,
        }
    }

    /// Gate and answer one burst, then commit its route if it was gated in.
    pub async fn process_burst(
        &self,
        key: &str,
        events: Vec<InboundEvent>,
    ) -> rgbot_auto_reply::Result<BurstOutcome> {
        let Some(latest) = events.last() else {
            return Ok(BurstOutcome::Empty);
        };
        let Some(envelope) = format_burst(&events, &self.envelope_options) else {
            return Ok(BurstOutcome::Empty);
        };
        let meta = &envelope.channel_meta;
        let default_config = ChannelConfig::default();
        let channel_config = self.config.channel(meta.channel).unwrap_or(&default_config);
        let account_id = meta.account_id.as_str();

        let policy = if meta.chat_type.is_group() {
            let group = meta.group.clone().unwrap_or_else(|| GroupContext {
                id: meta.conversation_key.clone(),
                ..Default::default()
            });
            resolve_group_policy(channel_config, account_id, &group)
        } else {
            GroupPolicy::direct()
        };

        let channel = self.registry.get(meta.channel);
        let resolved = self.allowlists.get(meta.channel, account_id);
        let mut authorizers = channel.command_authorizers(latest, channel_config);
        let global_allow = &self.config.commands.allow_from;
        authorizers.push(CommandAuthorizer {
            configured: !global_allow.is_empty(),
            allowed: is_sender_allowed(&latest.sender, global_allow),
        });
        authorizers.push(CommandAuthorizer {
            configured: !resolved.is_empty(),
            allowed: is_sender_allowed(&latest.sender, &resolved),
        });

        let mut dm_allow_from = channel_config.allow_from_for(account_id).to_vec();
        dm_allow_from.extend(resolved);

        let ctx = GateContext {
            mention_regexes: &self.mention_regexes,
            bot_handles: &self.bot_handles,
            commands: &self.config.commands,
            dm_policy: channel_config.dm_policy,
            dm_allow_from: &dm_allow_from,
            authorizers: &authorizers,
        };
        let decision = should_respond(&envelope, &policy, &ctx);
        if !decision.respond {
            debug!(
                key,
                reason = decision.reason.as_str(),
                burst_size = events.len(),
                "burst gated out"
            );
            return Ok(BurstOutcome::Skipped(decision.reason));
        }

        let plan = OutboundPlan::resolve(meta, Some(channel_config));
        let route_key = RouteKey::new(meta.channel, account_id, &meta.conversation_key);
        let route_target = RouteTarget {
            channel: meta.channel,
            account_id: meta.account_id.clone(),
            to: meta.conversation_key.clone(),
            thread_id: meta.thread_id.clone(),
        };

        let outcome = if decision.is_unauthorized_command() {
            let command = decision.command_name.unwrap_or_default();
            info!(
                key,
                command,
                sender = %meta.sender.id,
                "unauthorized control command"
            );
            BurstOutcome::Refused(
                self.dispatcher
                    .send_refusal(channel.as_ref(), &plan, command)
                    .await,
            )
        } else {
            let request = AgentRequest::new(envelope.clone())
                .with_tools(decision.tools.clone())
                .with_command(
                    decision
                        .authorized_command
                        .then_some(decision.command_name)
                        .flatten(),
                );
            BurstOutcome::Replied(self.dispatcher.dispatch(&request, channel, &plan).await)
        };

        if outcome.dispatch_result().is_some_and(|r| r.delivered > 0) {
            self.activity.record_outbound(route_target.channel, account_id);
        }

        let committed = self
            .recorder
            .commit(&route_key, route_target)
            .await
            .map_err(|e| rgbot_auto_reply::Error::flush(key, e))?;
        if committed.target_changed {
            debug!(key, "route target updated");
        }
        Ok(outcome)
    }
}

#[async_trait]
impl FlushHandler<InboundEvent> for InboundPipeline {
    async fn on_flush(&self, key: &str, events: Vec<InboundEvent>) -> rgbot_auto_reply::Result<()> {
        self.process_burst(key, events).await.map(|_| ())
    }
}

/// The sink channel monitors push into. Records activity and hands events
/// to the debouncer.
pub struct DebouncedSink {
    debouncer: InboundDebouncer<InboundEvent>,
    activity: Arc<ChannelActivity>,
}

impl DebouncedSink {
    pub fn new(debouncer: InboundDebouncer<InboundEvent>, activity: Arc<ChannelActivity>) -> Self {
        Self {
            debouncer,
            activity,
        }
    }
}

#[async_trait]
impl InboundSink for DebouncedSink {
    async fn push(&self, event: InboundEvent) {
        #[cfg(feature = "metrics")]
        counter!(
            channel_metrics::MESSAGES_RECEIVED_TOTAL,
            labels::CHANNEL => event.channel.as_str()
        )
        .increment(1);
        self.activity.record_inbound(event.channel, &event.account_id);

        if event.raw_text.trim().is_empty() && event.attachments.is_empty() {
            warn!(
                channel = %event.channel,
                account_id = %event.account_id,
                conversation_key = %event.conversation_key,
                "dropping empty inbound event"
            );
            return;
        }
        self.debouncer.enqueue(event);
    }
}
