//! End-to-end pipeline tests: channel monitor → debouncer → gate → dispatch
//! → route commit, with an in-memory channel and route store.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    rgbot_auto_reply::{AgentRequest, EchoAgent, ReplyAgent},
    rgbot_channels::{
        ChannelCapability, ChannelRegistry, ChannelTarget, InboundSink, MonitorHandle,
        ProbeResult, SendOptions, SendReceipt,
    },
    rgbot_common::types::{ChannelType, GroupContext, InboundEvent, SenderIdentity},
    rgbot_config::{ChannelConfig, DmPolicy, RgbotConfig, SessionStoreKind},
    rgbot_gateway::{PluginRuntime, SkippedChannel, StartedAccount},
    rgbot_sessions::{MemoryRouteStore, RouteKey},
};

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: AtomicBool,
    resolved_ids: Mutex<Vec<String>>,
    sink: Mutex<Option<Arc<dyn InboundSink>>>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl RecordingChannel {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }
}

#[async_trait]
impl ChannelCapability for RecordingChannel {
    fn channel(&self) -> ChannelType {
        ChannelType::Telegram
    }

    async fn probe(&self, _account_id: &str) -> rgbot_channels::Result<ProbeResult> {
        Ok(ProbeResult::ok())
    }

    async fn send(
        &self,
        target: &ChannelTarget,
        content: &str,
        _options: &SendOptions,
    ) -> rgbot_channels::Result<SendReceipt> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(rgbot_channels::Error::delivery("bot was blocked by the user"));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((target.chat_id.clone(), content.to_string()));
        Ok(SendReceipt {
            message_id: sent.len().to_string(),
        })
    }

    async fn resolve_allowlist(&self, _account_id: &str) -> rgbot_channels::Result<Vec<String>> {
        Ok(self.resolved_ids.lock().unwrap().clone())
    }

    async fn monitor(
        &self,
        _account_id: &str,
        sink: Arc<dyn InboundSink>,
    ) -> rgbot_channels::Result<MonitorHandle> {
        let handle = MonitorHandle::detached();
        *self.sink.lock().unwrap() = Some(sink);
        *self.monitor.lock().unwrap() = Some(handle.clone());
        Ok(handle)
    }
}

fn config() -> RgbotConfig {
    let mut config = RgbotConfig::default();
    config.messages.inbound.debounce_ms = 100;
    config.messages.typing = false;
    config.session.store = SessionStoreKind::Memory;
    config
        .channels
        .insert(ChannelType::Telegram, ChannelConfig::default());
    config
}

/// Echoes after thinking for a while.
struct SlowAgent(Duration);

#[async_trait]
impl ReplyAgent for SlowAgent {
    async fn reply(&self, request: &AgentRequest) -> anyhow::Result<String> {
        tokio::time::sleep(self.0).await;
        EchoAgent.reply(request).await
    }
}

fn runtime(config: RgbotConfig, channel: &Arc<RecordingChannel>) -> PluginRuntime {
    runtime_with_agent(config, channel, Arc::new(EchoAgent))
}

fn runtime_with_agent(
    config: RgbotConfig,
    channel: &Arc<RecordingChannel>,
    agent: Arc<dyn ReplyAgent>,
) -> PluginRuntime {
    let mut registry = ChannelRegistry::new();
    registry.register(Arc::clone(channel) as _);
    PluginRuntime::new(config, registry, agent, Arc::new(MemoryRouteStore::new()))
}

fn dm(text: &str) -> InboundEvent {
    InboundEvent::new(
        ChannelType::Telegram,
        "default",
        "42",
        SenderIdentity::new("7"),
        text,
    )
}

fn group(sender: &str, text: &str) -> InboundEvent {
    InboundEvent::new(
        ChannelType::Telegram,
        "default",
        "-100",
        SenderIdentity::new(sender),
        text,
    )
    .in_group(GroupContext {
        id: "-100".into(),
        ..Default::default()
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn burst_is_answered_once_and_route_committed() {
    let channel = Arc::new(RecordingChannel::default());
    let rt = runtime(config(), &channel);
    let sink = rt.sink();

    sink.push(dm("a")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    sink.push(dm("b")).await;
    sink.push(dm("c")).await;
    settle().await;

    assert_eq!(channel.sent(), vec![("42".to_string(), "a\nb\nc".to_string())]);

    let key = RouteKey::new(ChannelType::Telegram, "default", "42");
    let route = rt.recorder().load(&key).await.unwrap().unwrap();
    assert_eq!(route.last_route_target.to, "42");

    let activity = rt.activity().get(ChannelType::Telegram, "default").unwrap();
    assert!(activity.last_inbound_at.is_some());
    assert!(activity.last_outbound_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn separate_windows_get_separate_replies() {
    let channel = Arc::new(RecordingChannel::default());
    let rt = runtime(config(), &channel);
    let sink = rt.sink();

    sink.push(dm("first")).await;
    settle().await;
    sink.push(dm("second")).await;
    settle().await;

    assert_eq!(channel.texts(), vec!["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn group_messages_need_a_mention() {
    let channel = Arc::new(RecordingChannel::default());
    let rt = runtime(config(), &channel);
    let sink = rt.sink();
    let key = RouteKey::new(ChannelType::Telegram, "default", "-100");

    sink.push(group("7", "hello boot")).await;
    settle().await;
    assert!(channel.sent().is_empty());
    assert!(rt.recorder().load(&key).await.unwrap().is_none());

    sink.push(group("7", "hello rgbot")).await;
    settle().await;
    assert_eq!(channel.texts(), vec!["hello rgbot"]);
    assert!(rt.recorder().load(&key).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn unauthorized_command_gets_a_refusal() {
    let channel = Arc::new(RecordingChannel::default());
    let mut config = config();
    config.commands.allow_from = vec!["admin".into()];
    let rt = runtime(config, &channel);
    let sink = rt.sink();

    sink.push(group("bob", "/reset")).await;
    settle().await;
    assert_eq!(channel.texts(), vec![
        "Sorry, you are not allowed to use that command here."
    ]);

    sink.push(group("admin", "/status")).await;
    settle().await;
    let texts = channel.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("via Telegram"), "{}", texts[1]);
}

#[tokio::test(start_paused = true)]
async fn failed_delivery_leaves_conversation_responsive() {
    let channel = Arc::new(RecordingChannel::default());
    let rt = runtime(config(), &channel);
    let sink = rt.sink();

    channel.fail_sends.store(true, Ordering::SeqCst);
    sink.push(dm("one")).await;
    settle().await;
    assert!(channel.sent().is_empty());
    let activity = rt.activity().get(ChannelType::Telegram, "default").unwrap();
    assert_eq!(activity.last_outbound_at, None);

    channel.fail_sends.store(false, Ordering::SeqCst);
    sink.push(dm("two")).await;
    settle().await;
    assert_eq!(channel.texts(), vec!["two"]);
}

#[tokio::test(start_paused = true)]
async fn start_skips_broken_channels_and_runs_the_rest() {
    let channel = Arc::new(RecordingChannel::default());
    let mut config = config();
    config
        .channels
        .insert(ChannelType::Discord, ChannelConfig::default());
    config.channels.insert(ChannelType::Slack, ChannelConfig {
        text_chunk_limit: Some(0),
        ..Default::default()
    });
    config.channels.insert(ChannelType::Line, ChannelConfig {
        enabled: false,
        ..Default::default()
    });
    let rt = runtime(config, &channel);

    let report = rt.start().await.unwrap();
    assert_eq!(report.started, vec![StartedAccount {
        channel: ChannelType::Telegram,
        account_id: "default".into(),
    }]);
    let skipped: Vec<(ChannelType, Option<String>)> = report
        .skipped
        .iter()
        .map(|SkippedChannel { channel, account_id, .. }| (*channel, account_id.clone()))
        .collect();
    assert_eq!(skipped, vec![
        (ChannelType::Discord, Some("default".to_string())),
        (ChannelType::Slack, None),
    ]);
    assert!(rt.start().await.is_err());

    let sink = channel.sink.lock().unwrap().clone().unwrap();
    sink.push(dm("via monitor")).await;
    settle().await;
    assert_eq!(channel.texts(), vec!["via monitor"]);

    assert!(rt.shutdown(Duration::from_secs(1)).await);
    let handle = channel.monitor.lock().unwrap().clone().unwrap();
    assert!(handle.is_stopped());
    assert!(rt.running().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_pending_windows_without_replying() {
    let channel = Arc::new(RecordingChannel::default());
    let rt = runtime(config(), &channel);

    rt.sink().push(dm("never answered")).await;
    assert_eq!(rt.debouncer().pending_keys(), vec!["telegram:default:42"]);

    assert!(rt.shutdown(Duration::from_secs(1)).await);
    settle().await;
    assert!(channel.sent().is_empty());
    assert!(rt.debouncer().pending_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_deadline_cuts_off_a_slow_reply() {
    let channel = Arc::new(RecordingChannel::default());
    let rt = runtime_with_agent(config(), &channel, Arc::new(SlowAgent(Duration::from_secs(30))));

    rt.sink().push(dm("take your time")).await;
    settle().await;
    assert!(rt.debouncer().pending_keys().is_empty());

    assert!(!rt.shutdown(Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn provider_resolved_ids_admit_direct_messages() {
    let channel = Arc::new(RecordingChannel::default());
    *channel.resolved_ids.lock().unwrap() = vec!["7".into()];
    let mut config = config();
    config.channels.insert(ChannelType::Telegram, ChannelConfig {
        dm_policy: DmPolicy::Allowlist,
        allow_from: vec!["@alice".into()],
        ..Default::default()
    });
    let rt = runtime(config, &channel);

    // Before start nothing is resolved and sender 7 is not `@alice`.
    rt.sink().push(dm("before")).await;
    settle().await;
    assert!(channel.sent().is_empty());

    rt.start().await.unwrap();
    assert_eq!(rt.allowlists().get(ChannelType::Telegram, "default"), vec!["7"]);
    rt.sink().push(dm("after")).await;
    settle().await;
    assert_eq!(channel.texts(), vec!["after"]);
}

#[tokio::test(start_paused = true)]
async fn commands_addressed_to_another_bot_are_ignored() {
    let channel = Arc::new(RecordingChannel::default());
    let mut config = config();
    config.commands.allow_from = vec!["admin".into()];
    let rt = runtime(config, &channel);

    rt.sink().push(group("bob", "/reset@otherbot")).await;
    settle().await;
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn version_comes_from_the_manifest() {
    let channel = Arc::new(RecordingChannel::default());
    let rt = runtime(config(), &channel);
    assert_eq!(rt.version(), env!("CARGO_PKG_VERSION"));
}
