mod channel_commands;
mod config_commands;

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    rgbot_auto_reply::EchoAgent,
    rgbot_channels::ChannelRegistry,
    rgbot_config::RgbotConfig,
    rgbot_gateway::PluginRuntime,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "rgbot", version, about = "rgbot, a multi-channel chat bot gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./rgbot.toml and ~/.config/rgbot/).
    #[arg(long, global = true, env = "RGBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for session stores (overrides the platform default).
    #[arg(long, global = true, env = "RGBOT_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default when no subcommand is provided).
    Gateway {
        /// Seconds to wait for in-flight replies on shutdown.
        #[arg(long, default_value_t = 10)]
        shutdown_timeout: u64,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Channel inspection.
    Channels {
        #[command(subcommand)]
        action: channel_commands::ChannelAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the explicit config file, or discover one.
pub(crate) fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RgbotConfig> {
    match path {
        Some(path) => Ok(rgbot_config::load_config(path)?),
        None => Ok(rgbot_config::discover_and_load()),
    }
}

async fn run_gateway(cli: &Cli, shutdown_timeout: u64) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_ref())?;
    let data_dir = cli.data_dir.clone().or_else(rgbot_config::data_dir);

    // No wire adapters ship with the binary; unregistered channels resolve
    // to null channels and are reported as skipped.
    let registry = ChannelRegistry::new();
    let runtime =
        PluginRuntime::from_config(config, registry, Arc::new(EchoAgent), data_dir.as_deref())
            .await?;

    let report = runtime.start().await?;
    for skipped in &report.skipped {
        warn!(
            channel = %skipped.channel,
            account_id = skipped.account_id.as_deref().unwrap_or("*"),
            reason = %skipped.reason,
            "channel skipped"
        );
    }
    if report.started.is_empty() {
        warn!("no channel accounts running; waiting for shutdown");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let drained = runtime
        .shutdown(Duration::from_secs(shutdown_timeout))
        .await;
    if !drained {
        warn!("exiting with replies still in flight");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "rgbot starting");

    match &cli.command {
        None => run_gateway(&cli, 10).await,
        Some(Commands::Gateway { shutdown_timeout }) => run_gateway(&cli, *shutdown_timeout).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
        Some(Commands::Channels { action }) => {
            let config = load_config(cli.config.as_ref())?;
            channel_commands::handle_channels(action, &config)
        },
    }
}
