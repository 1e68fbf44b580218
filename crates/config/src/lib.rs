//! Configuration loading, validation, and env substitution.
//!
//! Config files: `rgbot.toml`, `rgbot.yaml`, or `rgbot.json`
//! Searched in `./` then `~/.config/rgbot/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        config_dir, data_dir, discover_and_load, find_config_file, load_config, parse_config,
    },
    schema::{
        AccessGroupsOffMode, AccountConfig, AgentConfig, ChannelConfig, ChunkMode,
        CommandsConfig, DEFAULT_ACCOUNT_ID, DmPolicy, EnvelopeConfig, GroupAccess, GroupConfig,
        HumanDelayConfig, InboundConfig, MessagesConfig, RetryConfig, RgbotConfig,
        SenderToolRule, SessionConfig, SessionStoreKind, TableMode, ToolPolicy,
    },
    validate::{
        Diagnostic, Severity, ValidationResult, validate, validate_channel, validate_toml_str,
    },
};
