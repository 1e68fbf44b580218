use std::time::Duration;

/// Errors raised inside the reply pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A control command failed authorization. Surfaced to the user as a
    /// polite refusal.
    #[error("command /{command} is not authorized for this sender")]
    Unauthorized { command: String },

    /// The flush handler failed for a burst. Logged; the conversation stays
    /// responsive for the next burst.
    #[error("flush failed for {key}: {message}")]
    Flush { key: String, message: String },

    /// The reply agent failed.
    #[error("agent failed: {0:#}")]
    Agent(anyhow::Error),

    #[error("agent timed out after {0:?}")]
    Timeout(Duration),

    /// A chunk send failed; later chunks were not attempted.
    #[error("delivered {delivered} of {total} chunks: {source}")]
    PartialDelivery {
        delivered: usize,
        total: usize,
        #[source]
        source: rgbot_channels::Error,
    },

    #[error(transparent)]
    Channel(#[from] rgbot_channels::Error),
}

impl Error {
    #[must_use]
    pub fn unauthorized(command: impl Into<String>) -> Self {
        Self::Unauthorized {
            command: command.into(),
        }
    }

    #[must_use]
    pub fn flush(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Flush {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
