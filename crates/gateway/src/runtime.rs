//! Process-scoped runtime: owns the config snapshot, channel registry,
//! debouncer, dispatcher and session recorder, and the monitor lifecycle.

use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use {
    rgbot_auto_reply::{
        DispatchSettings, InboundDebouncer, ReplyAgent, ReplyDispatcher,
        resolve_inbound_debounce_ms,
    },
    rgbot_channels::{ChannelCapability, ChannelRegistry, InboundSink, MonitorHandle},
    rgbot_common::types::{ChannelType, InboundEvent},
    rgbot_config::{RgbotConfig, validate_channel},
    rgbot_sessions::{RouteStore, SessionRecorder},
    serde::Serialize,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use rgbot_metrics::{channels as channel_metrics, counter, labels};

use crate::{
    activity::ChannelActivity,
    allowlist::ResolvedAllowlists,
    error::{Error, Result},
    inbound::{DebouncedSink, InboundPipeline},
    session_store::open_route_store,
};

/// A running monitor subscription for one channel account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedAccount {
    pub channel: ChannelType,
    pub account_id: String,
}

/// A channel or account that did not start, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedChannel {
    pub channel: ChannelType,
    /// `None` when the whole channel was rejected.
    pub account_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StartReport {
    pub started: Vec<StartedAccount>,
    pub skipped: Vec<SkippedChannel>,
}

struct RunningMonitor {
    account: StartedAccount,
    handle: MonitorHandle,
}

pub struct PluginRuntime {
    version: &'static str,
    config: Arc<RgbotConfig>,
    registry: Arc<ChannelRegistry>,
    activity: Arc<ChannelActivity>,
    allowlists: Arc<ResolvedAllowlists>,
    recorder: Arc<SessionRecorder>,
    dispatcher: Arc<ReplyDispatcher>,
    pipeline: Arc<InboundPipeline>,
    debouncer: InboundDebouncer<InboundEvent>,
    sink: Arc<DebouncedSink>,
    monitors: Mutex<Option<Vec<RunningMonitor>>>,
}

impl PluginRuntime {
    /// Wire the runtime around an already opened route store.
    pub fn new(
        config: RgbotConfig,
        registry: ChannelRegistry,
        agent: Arc<dyn ReplyAgent>,
        store: Arc<dyn RouteStore>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(registry);
        let activity = Arc::new(ChannelActivity::new());
        let allowlists = Arc::new(ResolvedAllowlists::new());
        let recorder = Arc::new(SessionRecorder::new(store));
        let dispatcher = Arc::new(ReplyDispatcher::new(
            agent,
            DispatchSettings::from_config(&config),
        ));
        let pipeline = Arc::new(InboundPipeline::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            Arc::clone(&recorder),
            Arc::clone(&activity),
            Arc::clone(&allowlists),
        ));

        let inbound = config.messages.inbound.clone();
        let debouncer = InboundDebouncer::with_window_fn(
            Arc::clone(&pipeline) as _,
            Arc::new(move |event: &InboundEvent| {
                Duration::from_millis(resolve_inbound_debounce_ms(&inbound, event.channel, None))
            }),
        );
        let sink = Arc::new(DebouncedSink::new(debouncer.clone(), Arc::clone(&activity)));

        Self {
            version: env!("CARGO_PKG_VERSION"),
            config,
            registry,
            activity,
            allowlists,
            recorder,
            dispatcher,
            pipeline,
            debouncer,
            sink,
            monitors: Mutex::new(None),
        }
    }

    /// Open the configured session store under `data_dir` and wire the
    /// runtime around it.
    pub async fn from_config(
        config: RgbotConfig,
        registry: ChannelRegistry,
        agent: Arc<dyn ReplyAgent>,
        data_dir: Option<&Path>,
    ) -> Result<Self> {
        let store = open_route_store(&config.session, data_dir).await?;
        Ok(Self::new(config, registry, agent, store))
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn config(&self) -> &RgbotConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn activity(&self) -> &ChannelActivity {
        &self.activity
    }

    /// Allowlists resolved by channel providers at start.
    pub fn allowlists(&self) -> &ResolvedAllowlists {
        &self.allowlists
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn dispatcher(&self) -> &ReplyDispatcher {
        &self.dispatcher
    }

    pub fn pipeline(&self) -> &InboundPipeline {
        &self.pipeline
    }

    pub fn debouncer(&self) -> &InboundDebouncer<InboundEvent> {
        &self.debouncer
    }

    /// Sink for adapters that push events without going through `start()`.
    pub fn sink(&self) -> Arc<dyn InboundSink> {
        Arc::clone(&self.sink) as _
    }

    /// Accounts with a running monitor.
    pub fn running(&self) -> Vec<StartedAccount> {
        self.monitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flatten()
            .map(|m| m.account.clone())
            .collect()
    }

    /// Validate, probe and start a monitor for every enabled channel account.
    ///
    /// A channel with invalid config, a failed probe or a failed monitor is
    /// skipped and logged; the rest still start.
    pub async fn start(&self) -> Result<StartReport> {
        {
            let mut monitors = self.monitors.lock().unwrap_or_else(PoisonError::into_inner);
            if monitors.is_some() {
                return Err(Error::AlreadyStarted);
            }
            *monitors = Some(Vec::new());
        }

        let mut report = StartReport::default();
        let mut channels: Vec<_> = self
            .config
            .channels
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .collect();
        channels.sort_by_key(|(channel, _)| **channel);

        for (&channel, channel_config) in channels {
            if let Err(e) = validate_channel(channel, channel_config) {
                let e = Error::from(e);
                self.skip(&mut report, channel, None, &e);
                continue;
            }
            let capability = self.registry.get(channel);
            for account_id in channel_config.account_ids() {
                match self.start_account(channel, &account_id, &capability).await {
                    Ok(handle) => {
                        info!(%channel, account_id = %account_id, "channel account started");
                        let account = StartedAccount {
                            channel,
                            account_id,
                        };
                        report.started.push(account.clone());
                        self.monitors
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .get_or_insert_with(Vec::new)
                            .push(RunningMonitor { account, handle });
                    },
                    Err(e) => self.skip(&mut report, channel, Some(account_id), &e),
                }
            }
        }

        info!(
            version = self.version,
            started = report.started.len(),
            skipped = report.skipped.len(),
            "runtime started"
        );
        Ok(report)
    }

    async fn start_account(
        &self,
        channel: ChannelType,
        account_id: &str,
        capability: &Arc<dyn ChannelCapability>,
    ) -> Result<MonitorHandle> {
        let probe = capability.probe(account_id).await?;
        if !probe.ok {
            return Err(Error::probe_failed(
                channel,
                account_id,
                probe.detail.unwrap_or_else(|| "no detail".into()),
            ));
        }
        let allowlist = capability.resolve_allowlist(account_id).await?;
        if !allowlist.is_empty() {
            debug!(%channel, account_id, entries = allowlist.len(), "provider allowlist resolved");
        }
        self.allowlists.set(channel, account_id, allowlist);
        Ok(capability.monitor(account_id, self.sink()).await?)
    }

    fn skip(
        &self,
        report: &mut StartReport,
        channel: ChannelType,
        account_id: Option<String>,
        e: &Error,
    ) {
        error!(
            %channel,
            account_id = account_id.as_deref().unwrap_or("*"),
            error_type = e.kind(),
            error = %e,
            "channel not started"
        );
        #[cfg(feature = "metrics")]
        counter!(
            channel_metrics::START_FAILURES_TOTAL,
            labels::CHANNEL => channel.as_str(),
            labels::ERROR_TYPE => e.kind()
        )
        .increment(1);
        report.skipped.push(SkippedChannel {
            channel,
            account_id,
            reason: e.to_string(),
        });
    }

    /// Stop every monitor, drop pending debounce windows without replying,
    /// and give in-flight bursts up to `deadline` to finish. Bursts still
    /// running at the deadline are aborted before sending anything more.
    /// Returns `true` if nothing was still running at the deadline.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        let monitors = self
            .monitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();
        for monitor in &monitors {
            monitor.handle.stop();
            debug!(
                channel = %monitor.account.channel,
                account_id = %monitor.account.account_id,
                "monitor stopped"
            );
        }
        let drained = self.debouncer.shutdown(deadline).await;
        self.allowlists.clear();
        if drained {
            info!(monitors = monitors.len(), "runtime shut down");
        } else {
            warn!(monitors = monitors.len(), "runtime shut down, in-flight bursts aborted");
        }
        drained
    }
}
