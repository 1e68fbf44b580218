//! Inbound reply pipeline: the glue between channel adapters and the agent.
//!
//! Flow: inbound event → debounce burst → envelope → gate (mentions, DM
//! policy, command authorization) → agent → markdown tables → chunking →
//! sequential delivery via the channel.

pub mod agent;
pub mod chunk;
pub mod commands;
pub mod debounce;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod gate;
pub mod markdown;
pub mod mentions;

pub use {
    agent::{AgentRequest, EchoAgent, ReplyAgent, SILENT_REPLY_TOKEN, is_silent_reply},
    chunk::{ReplyChunk, chunk_text, resolve_chunk_mode, resolve_table_mode, resolve_text_chunk_limit},
    commands::{CONTROL_COMMANDS, ControlCommand, has_control_command, is_control_command_message},
    debounce::{DebounceItem, FlushHandler, InboundDebouncer, resolve_inbound_debounce_ms},
    dispatch::{DispatchResult, DispatchSettings, OutboundPlan, ReplyDispatcher},
    envelope::{AgentEnvelope, ChannelMeta, EnvelopeOptions, EnvelopeTimezone, format, format_burst},
    error::{Error, Result},
    gate::{CommandStatus, GateContext, GateDecision, GateReason, should_respond},
    markdown::{convert_markdown_tables, normalize_dialect},
    mentions::{
        bot_handles, build_mention_regexes, matches_mention_patterns,
        matches_mention_with_explicit,
    },
};
