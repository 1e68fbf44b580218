//! Channel capability system.
//!
//! Each messaging platform (Discord, WhatsApp, Slack, Telegram, ...) implements
//! [`ChannelCapability`]. Platforms without a registered adapter resolve to
//! [`NullChannel`] so the pipeline never branches on "is this channel wired".

pub mod command_gating;
pub mod directory;
pub mod error;
pub mod gating;
pub mod groups;
pub mod plugin;
pub mod registry;

pub use {
    command_gating::{CommandAuthorizer, resolve_command_authorized_from_authorizers},
    directory::{
        DirectoryEntry, DirectoryKind, DirectoryQuery, list_groups_from_config,
        list_peers_from_config,
    },
    error::{Error, Result},
    gating::{dm_allowed, group_allowed, is_allowed, is_sender_allowed, sender_matches},
    groups::{GroupPolicy, normalize_slug, resolve_group_policy},
    plugin::{
        ChannelCapability, ChannelTarget, InboundSink, MessageAction, MonitorHandle, NullChannel,
        ProbeResult, SendOptions, SendReceipt,
    },
    registry::ChannelRegistry,
};
