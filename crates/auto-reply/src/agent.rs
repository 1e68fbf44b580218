//! The reply-generation seam. The gateway never looks inside the agent; it
//! hands over an envelope and gets text back.

use {async_trait::async_trait, rgbot_config::ToolPolicy};

use crate::envelope::AgentEnvelope;

/// A reply consisting of exactly this token (case-insensitive, surrounding
/// whitespace ignored) means the agent chose not to answer.
pub const SILENT_REPLY_TOKEN: &str = "NO_REPLY";

/// Input for one agent turn.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub envelope: AgentEnvelope,
    /// `envelope.render()`, the text the model sees.
    pub prompt: String,
    /// Tools the sender may use; `None` means unrestricted.
    pub tools: Option<ToolPolicy>,
    /// Authorized control command carried by the message, if any.
    pub command: Option<&'static str>,
}

impl AgentRequest {
    pub fn new(envelope: AgentEnvelope) -> Self {
        Self {
            prompt: envelope.render(),
            envelope,
            tools: None,
            command: None,
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Option<ToolPolicy>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_command(mut self, command: Option<&'static str>) -> Self {
        self.command = command;
        self
    }
}

/// Produces the reply text for a gated-in burst. May take seconds.
#[async_trait]
pub trait ReplyAgent: Send + Sync {
    async fn reply(&self, request: &AgentRequest) -> anyhow::Result<String>;
}

/// Whether `reply` should produce no outbound message at all.
pub fn is_silent_reply(reply: &str) -> bool {
    let trimmed = reply.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SILENT_REPLY_TOKEN)
}

/// Repeats the message back. Used when no model backend is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoAgent;

#[async_trait]
impl ReplyAgent for EchoAgent {
    async fn reply(&self, request: &AgentRequest) -> anyhow::Result<String> {
        let envelope = &request.envelope;
        Ok(match request.command {
            Some("status") => format!(
                "{} via {} ({} message(s) in this burst)",
                env!("CARGO_PKG_NAME"),
                envelope.channel_meta.channel.label(),
                envelope.channel_meta.burst_size
            ),
            Some("whoami") => format!(
                "you are {} ({})",
                envelope.sender_display, envelope.channel_meta.sender.id
            ),
            _ => envelope.text.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::envelope::{EnvelopeOptions, format},
        rgbot_common::types::{ChannelType, InboundEvent, SenderIdentity},
        rstest::rstest,
    };

    fn request(text: &str) -> AgentRequest {
        let event = InboundEvent::new(
            ChannelType::Signal,
            "default",
            "+1555",
            SenderIdentity::new("+1555"),
            text,
        );
        AgentRequest::new(format(&event, &EnvelopeOptions::default()))
    }

    #[rstest]
    #[case("", true)]
    #[case("  \n ", true)]
    #[case("NO_REPLY", true)]
    #[case(" no_reply\n", true)]
    #[case("NO_REPLY but more", false)]
    #[case("hi", false)]
    fn silent_replies(#[case] reply: &str, #[case] silent: bool) {
        assert_eq!(is_silent_reply(reply), silent);
    }

    #[tokio::test]
    async fn echo_repeats_text() {
        let reply = EchoAgent.reply(&request("hello there")).await.unwrap();
        assert_eq!(reply, "hello there");
    }

    #[tokio::test]
    async fn echo_answers_whoami() {
        let req = request("/whoami").with_command(Some("whoami"));
        let reply = EchoAgent.reply(&req).await.unwrap();
        assert_eq!(reply, "you are +1555 (+1555)");
    }

    #[test]
    fn prompt_is_rendered_envelope() {
        let req = request("hi");
        assert_eq!(req.prompt, req.envelope.render());
    }
}
