//! Plugin runtime: wires channel capabilities to the inbound reply pipeline.
//!
//! Channel monitors push events into a [`DebouncedSink`]; flushed bursts go
//! through [`InboundPipeline`] (envelope, gate, dispatch, route commit).
//! [`PluginRuntime`] owns all process-scoped state and its start/shutdown.

pub mod activity;
pub mod allowlist;
pub mod error;
pub mod inbound;
pub mod runtime;
pub mod session_store;

pub use {
    activity::{AccountActivity, ActivityTimestamps, ChannelActivity},
    allowlist::ResolvedAllowlists,
    error::{Error, Result},
    inbound::{BurstOutcome, DebouncedSink, InboundPipeline},
    runtime::{PluginRuntime, SkippedChannel, StartReport, StartedAccount},
    session_store::open_route_store,
};
