use std::sync::Arc;

use {
    async_trait::async_trait,
    rgbot_common::types::{ChannelType, InboundEvent},
    rgbot_config::ChannelConfig,
    serde::{Deserialize, Serialize},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::{
    Result,
    command_gating::CommandAuthorizer,
    error::Error,
    gating::is_sender_allowed,
};

/// Where to send a reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelTarget {
    pub channel: ChannelType,
    pub account_id: String,
    /// Chat/peer ID to send to.
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl ChannelTarget {
    /// Reply target for the conversation an event came from.
    pub fn from_event(event: &InboundEvent) -> Self {
        Self {
            channel: event.channel,
            account_id: event.account_id.clone(),
            chat_id: event.conversation_key.clone(),
            thread_id: event.thread_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Platform message ID to reply to / quote.
    pub reply_to: Option<String>,
    /// Suppress notifications where the platform supports it.
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Liveness / credential check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub ok: bool,
    pub detail: Option<String>,
}

impl ProbeResult {
    pub fn ok() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

/// Message operations a channel supports beyond plain sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageAction {
    Send,
    Reply,
    Edit,
    Delete,
    React,
    Typing,
}

/// Receives inbound events from a channel monitor. The gateway provides the
/// concrete implementation.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn push(&self, event: InboundEvent);
}

/// Handle to a running monitor subscription.
///
/// Stopping is idempotent; clones share the same subscription.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    token: CancellationToken,
}

impl MonitorHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Handle whose token the monitor task should watch.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for the monitor task to select on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Capability set of one messaging platform.
#[async_trait]
pub trait ChannelCapability: Send + Sync {
    fn channel(&self) -> ChannelType;

    /// Check that the account's credentials work and the provider is reachable.
    async fn probe(&self, account_id: &str) -> Result<ProbeResult>;

    /// Deliver one message. Implementations map provider rejections to
    /// [`Error::Delivery`] and network failures / rate limits to
    /// [`Error::Transient`].
    async fn send(
        &self,
        target: &ChannelTarget,
        content: &str,
        options: &SendOptions,
    ) -> Result<SendReceipt>;

    /// Send a "typing" indicator. No-op by default.
    async fn send_typing(&self, _target: &ChannelTarget) -> Result<()> {
        Ok(())
    }

    /// Clear a "typing" indicator. No-op by default; most platforms expire it.
    async fn stop_typing(&self, _target: &ChannelTarget) -> Result<()> {
        Ok(())
    }

    /// Subscribe to inbound messages for an account. Events are pushed into
    /// `sink` until the returned handle is stopped.
    async fn monitor(&self, account_id: &str, sink: Arc<dyn InboundSink>) -> Result<MonitorHandle>;

    /// Identifiers (users or channels) the provider itself allowlists.
    async fn resolve_allowlist(&self, _account_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn message_actions(&self) -> &'static [MessageAction] {
        &[MessageAction::Send]
    }

    /// Authorizers consulted for control commands. The default is the
    /// account allowlist; adapters with role data add their own.
    fn command_authorizers(
        &self,
        event: &InboundEvent,
        config: &ChannelConfig,
    ) -> Vec<CommandAuthorizer> {
        let allow_from = config.allow_from_for(&event.account_id);
        vec![CommandAuthorizer {
            configured: !allow_from.is_empty(),
            allowed: is_sender_allowed(&event.sender, allow_from),
        }]
    }
}

/// Stand-in for channels with no registered adapter.
///
/// Probes fail, sends are unavailable, and monitors never produce events.
#[derive(Debug, Clone, Copy)]
pub struct NullChannel {
    channel: ChannelType,
}

impl NullChannel {
    pub fn new(channel: ChannelType) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelCapability for NullChannel {
    fn channel(&self) -> ChannelType {
        self.channel
    }

    async fn probe(&self, _account_id: &str) -> Result<ProbeResult> {
        Ok(ProbeResult::failed(format!(
            "no {} adapter registered",
            self.channel
        )))
    }

    async fn send(
        &self,
        target: &ChannelTarget,
        _content: &str,
        _options: &SendOptions,
    ) -> Result<SendReceipt> {
        debug!(channel = %self.channel, chat_id = %target.chat_id, "dropping send on null channel");
        Err(Error::unavailable(format!(
            "no {} adapter registered",
            self.channel
        )))
    }

    async fn monitor(
        &self,
        account_id: &str,
        _sink: Arc<dyn InboundSink>,
    ) -> Result<MonitorHandle> {
        debug!(channel = %self.channel, account_id, "null channel monitor started");
        Ok(MonitorHandle::detached())
    }

    fn message_actions(&self) -> &'static [MessageAction] {
        &[]
    }
}
