use rgbot_common::types::ChannelType;

/// Runtime errors. Channel-scoped failures are logged and skip that channel;
/// only store setup failures stop the runtime from being built.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] rgbot_config::Error),

    #[error(transparent)]
    Channel(#[from] rgbot_channels::Error),

    #[error(transparent)]
    Sessions(#[from] rgbot_sessions::Error),

    #[error("{channel} account {account_id} failed its probe: {detail}")]
    ProbeFailed {
        channel: ChannelType,
        account_id: String,
        detail: String,
    },

    #[error("runtime already started")]
    AlreadyStarted,
}

impl Error {
    #[must_use]
    pub fn probe_failed(
        channel: ChannelType,
        account_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::ProbeFailed {
            channel,
            account_id: account_id.into(),
            detail: detail.into(),
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Channel(e) => e.kind(),
            Self::Sessions(_) => "sessions",
            Self::ProbeFailed { .. } => "probe",
            Self::AlreadyStarted => "already_started",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
