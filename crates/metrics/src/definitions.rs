//! Metric name and label definitions.
//!
//! Centralizing these keeps names consistent across crates and documents what
//! the pipeline exposes.

/// Inbound debouncer metrics
pub mod debounce {
    /// Events accepted by the debouncer
    pub const EVENTS_ENQUEUED_TOTAL: &str = "rgbot_debounce_events_enqueued_total";
    /// Bursts handed to the flush handler
    pub const FLUSHES_TOTAL: &str = "rgbot_debounce_flushes_total";
    /// Number of events per flushed burst
    pub const BURST_SIZE: &str = "rgbot_debounce_burst_size";
    /// Flush handler failures (logged and swallowed)
    pub const FLUSH_ERRORS_TOTAL: &str = "rgbot_debounce_flush_errors_total";
    /// Buffers dropped by cancel/shutdown
    pub const CANCELLED_TOTAL: &str = "rgbot_debounce_cancelled_total";
    /// Conversations with a pending window
    pub const PENDING_KEYS: &str = "rgbot_debounce_pending_keys";
}

/// Mention/command gate metrics
pub mod gate {
    /// Gate decisions, labelled by outcome
    pub const DECISIONS_TOTAL: &str = "rgbot_gate_decisions_total";
    /// Control commands refused for lack of authorization
    pub const UNAUTHORIZED_COMMANDS_TOTAL: &str = "rgbot_gate_unauthorized_commands_total";
}

/// Reply dispatcher metrics
pub mod dispatch {
    /// Dispatches started
    pub const DISPATCHES_TOTAL: &str = "rgbot_dispatch_total";
    /// End-to-end dispatch duration in seconds
    pub const DURATION_SECONDS: &str = "rgbot_dispatch_duration_seconds";
    /// Chunks delivered through a channel
    pub const CHUNKS_SENT_TOTAL: &str = "rgbot_dispatch_chunks_sent_total";
    /// Send retries on the first chunk
    pub const SEND_RETRIES_TOTAL: &str = "rgbot_dispatch_send_retries_total";
    /// Dispatches that ended in total or partial delivery failure
    pub const DELIVERY_FAILURES_TOTAL: &str = "rgbot_dispatch_delivery_failures_total";
    /// Agent invocations that failed or timed out
    pub const AGENT_ERRORS_TOTAL: &str = "rgbot_dispatch_agent_errors_total";
}

/// Session/route recorder metrics
pub mod sessions {
    /// Route commits
    pub const COMMITS_TOTAL: &str = "rgbot_session_route_commits_total";
    /// Commits that changed the stored route target
    pub const ROUTE_CHANGES_TOTAL: &str = "rgbot_session_route_changes_total";
    /// Store write duration in seconds
    pub const WRITE_DURATION_SECONDS: &str = "rgbot_session_route_write_duration_seconds";
}

/// Channel runtime metrics
pub mod channels {
    /// Number of registered channel capabilities
    pub const ACTIVE: &str = "rgbot_channels_active";
    /// Inbound events pushed by channel monitors
    pub const MESSAGES_RECEIVED_TOTAL: &str = "rgbot_channel_messages_received_total";
    /// Channel start failures (config or probe)
    pub const START_FAILURES_TOTAL: &str = "rgbot_channel_start_failures_total";
}

/// Common label keys
pub mod labels {
    pub const CHANNEL: &str = "channel";
    pub const ACCOUNT_ID: &str = "account_id";
    pub const OUTCOME: &str = "outcome";
    pub const ERROR_TYPE: &str = "error_type";
    pub const MODE: &str = "mode";
}
