//! Reply dispatcher: typing indicator, agent call, chunking and sequential
//! delivery for one gated-in burst.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    rand::Rng,
    rgbot_channels::{ChannelCapability, ChannelTarget, SendOptions, SendReceipt},
    rgbot_common::run_with_timeout,
    rgbot_config::{ChannelConfig, ChunkMode, HumanDelayConfig, RetryConfig, RgbotConfig, TableMode},
    tokio::{sync::oneshot, task::JoinHandle},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use rgbot_metrics::{counter, dispatch as dispatch_metrics, histogram, labels};

use crate::{
    agent::{AgentRequest, ReplyAgent, is_silent_reply},
    chunk::{chunk_text, resolve_chunk_mode, resolve_table_mode, resolve_text_chunk_limit},
    envelope::ChannelMeta,
    error::Error,
    markdown::convert_markdown_tables,
};

/// Dispatcher settings resolved from config.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub typing: bool,
    pub typing_interval: Duration,
    pub retry: RetryConfig,
    pub human_delay: HumanDelayConfig,
    /// `None` leaves the agent unbounded.
    pub agent_timeout: Option<Duration>,
    pub unauthorized_reply: String,
}

impl DispatchSettings {
    pub fn from_config(config: &RgbotConfig) -> Self {
        let messages = &config.messages;
        Self {
            typing: messages.typing,
            typing_interval: Duration::from_secs(messages.typing_interval_secs.max(1)),
            retry: messages.retry.clone(),
            human_delay: messages.human_delay.clone(),
            agent_timeout: (config.agent.timeout_secs > 0)
                .then(|| Duration::from_secs(config.agent.timeout_secs)),
            unauthorized_reply: messages.unauthorized_reply.clone(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&RgbotConfig::default())
    }
}

/// Where and how one reply is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPlan {
    pub target: ChannelTarget,
    pub chunk_limit: usize,
    pub chunk_mode: ChunkMode,
    pub table_mode: TableMode,
    pub typing: bool,
    /// Message the first chunk replies to.
    pub reply_to: Option<String>,
}

impl OutboundPlan {
    /// Resolve delivery settings for a conversation from its channel config.
    pub fn resolve(meta: &ChannelMeta, config: Option<&ChannelConfig>) -> Self {
        let account = meta.account_id.as_str();
        Self {
            target: ChannelTarget {
                channel: meta.channel,
                account_id: meta.account_id.clone(),
                chat_id: meta.conversation_key.clone(),
                thread_id: meta.thread_id.clone(),
            },
            chunk_limit: resolve_text_chunk_limit(meta.channel, config, account),
            chunk_mode: resolve_chunk_mode(config, account),
            table_mode: resolve_table_mode(meta.channel, config, account),
            typing: config.and_then(|c| c.typing).unwrap_or(true),
            reply_to: meta.message_id.clone(),
        }
    }
}

/// Outcome of one dispatch. Provider errors end up here instead of
/// propagating to the caller.
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Chunks delivered, in order.
    pub delivered: usize,
    /// Chunks the reply was split into.
    pub total: usize,
    pub message_ids: Vec<String>,
    pub error: Option<Error>,
}

impl DispatchResult {
    /// Nothing to send.
    pub fn silent() -> Self {
        Self::default()
    }

    fn from_error(error: Error) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_silent(&self) -> bool {
        self.total == 0 && self.error.is_none()
    }

    /// Some chunks went out before a failure.
    pub fn is_partial(&self) -> bool {
        self.failed() && self.delivered > 0
    }
}

// ── Typing indicator ─────────────────────────────────────────────────────

/// Keeps a typing indicator alive until stopped or dropped.
struct TypingGuard {
    done: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TypingGuard {
    fn start(channel: Arc<dyn ChannelCapability>, target: ChannelTarget, interval: Duration) -> Self {
        let (done_tx, mut done_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = channel.send_typing(&target).await {
                    warn!(
                        channel = %target.channel,
                        account_id = %target.account_id,
                        error = %e,
                        "typing indicator failed"
                    );
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = &mut done_rx => break,
                }
            }
            if let Err(e) = channel.stop_typing(&target).await {
                debug!(channel = %target.channel, error = %e, "clearing typing indicator failed");
            }
        });
        Self {
            done: Some(done_tx),
            task: Some(task),
        }
    }

    /// Stop the keepalive and wait until the indicator is cleared.
    async fn stop(mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        // Dispatch was cancelled mid-flight; the task clears the indicator.
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────

fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(
        retry
            .base_delay_ms
            .saturating_mul(factor)
            .min(retry.max_delay_ms),
    )
}

fn human_delay(config: &HumanDelayConfig) -> Option<Duration> {
    let (min, max) = match config {
        HumanDelayConfig::Off => return None,
        HumanDelayConfig::Natural => (800, 2500),
        HumanDelayConfig::Custom { min_ms, max_ms } => (*min_ms, *max_ms),
    };
    let ms = if min >= max {
        min
    } else {
        rand::rng().random_range(min..=max)
    };
    (ms > 0).then(|| Duration::from_millis(ms))
}

pub struct ReplyDispatcher {
    agent: Arc<dyn ReplyAgent>,
    settings: DispatchSettings,
}

impl ReplyDispatcher {
    pub fn new(agent: Arc<dyn ReplyAgent>, settings: DispatchSettings) -> Self {
        Self { agent, settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Produce and deliver a reply.
    ///
    /// The typing indicator runs from before the agent call until delivery
    /// ends, and is cleared even if this future is dropped.
    pub async fn dispatch(
        &self,
        request: &AgentRequest,
        channel: Arc<dyn ChannelCapability>,
        plan: &OutboundPlan,
    ) -> DispatchResult {
        let started = Instant::now();
        let target = &plan.target;
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::DISPATCHES_TOTAL, labels::CHANNEL => target.channel.as_str())
            .increment(1);

        let typing = (self.settings.typing && plan.typing).then(|| {
            TypingGuard::start(
                Arc::clone(&channel),
                target.clone(),
                self.settings.typing_interval,
            )
        });

        let reply = run_with_timeout(
            "agent reply",
            self.settings.agent_timeout,
            self.agent.reply(request),
        )
        .await;

        let result = match reply {
            Err(timed_out) => DispatchResult::from_error(Error::Timeout(timed_out.elapsed)),
            Ok(Err(e)) => DispatchResult::from_error(Error::Agent(e)),
            Ok(Ok(text)) if is_silent_reply(&text) => {
                debug!(
                    channel = %target.channel,
                    conversation_key = %target.chat_id,
                    "agent chose not to reply"
                );
                DispatchResult::silent()
            },
            Ok(Ok(text)) => self.deliver(channel.as_ref(), plan, &text).await,
        };

        if let Some(typing) = typing {
            typing.stop().await;
        }

        #[cfg(feature = "metrics")]
        {
            histogram!(dispatch_metrics::DURATION_SECONDS, labels::CHANNEL => target.channel.as_str())
                .record(started.elapsed().as_secs_f64());
            if matches!(result.error, Some(Error::Agent(_) | Error::Timeout(_))) {
                counter!(dispatch_metrics::AGENT_ERRORS_TOTAL, labels::CHANNEL => target.channel.as_str())
                    .increment(1);
            }
        }
        match &result.error {
            None => info!(
                channel = %target.channel,
                account_id = %target.account_id,
                conversation_key = %target.chat_id,
                chunks = result.total,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "reply dispatched"
            ),
            Some(e) => warn!(
                channel = %target.channel,
                account_id = %target.account_id,
                conversation_key = %target.chat_id,
                delivered = result.delivered,
                total = result.total,
                error = %e,
                "reply dispatch failed"
            ),
        }
        result
    }

    /// Convert tables, chunk, and send chunks in order. The first chunk is
    /// retried on transient errors; any later failure stops delivery.
    pub async fn deliver(
        &self,
        channel: &dyn ChannelCapability,
        plan: &OutboundPlan,
        reply: &str,
    ) -> DispatchResult {
        let text = convert_markdown_tables(reply.trim(), plan.table_mode);
        if text.trim().is_empty() {
            return DispatchResult::silent();
        }
        let chunks = chunk_text(&text, plan.chunk_limit, plan.chunk_mode);
        let total = chunks.len();
        let mut message_ids = Vec::with_capacity(total);

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0
                && let Some(delay) = human_delay(&self.settings.human_delay)
            {
                tokio::time::sleep(delay).await;
            }
            let options = SendOptions {
                reply_to: if index == 0 {
                    plan.reply_to.clone()
                } else {
                    None
                },
                silent: false,
            };
            let sent = if index == 0 {
                self.send_with_retry(channel, &plan.target, &chunk.text, &options)
                    .await
            } else {
                channel.send(&plan.target, &chunk.text, &options).await
            };
            match sent {
                Ok(receipt) => {
                    #[cfg(feature = "metrics")]
                    counter!(dispatch_metrics::CHUNKS_SENT_TOTAL, labels::CHANNEL => plan.target.channel.as_str())
                        .increment(1);
                    message_ids.push(receipt.message_id);
                },
                Err(e) => {
                    warn!(
                        channel = %plan.target.channel,
                        conversation_key = %plan.target.chat_id,
                        chunk = index + 1,
                        total,
                        error_type = e.kind(),
                        error = %e,
                        "chunk delivery failed, dropping the rest of the reply"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(
                        dispatch_metrics::DELIVERY_FAILURES_TOTAL,
                        labels::CHANNEL => plan.target.channel.as_str(),
                        labels::ERROR_TYPE => e.kind()
                    )
                    .increment(1);
                    return DispatchResult {
                        delivered: index,
                        total,
                        message_ids,
                        error: Some(Error::PartialDelivery {
                            delivered: index,
                            total,
                            source: e,
                        }),
                    };
                },
            }
        }

        DispatchResult {
            delivered: total,
            total,
            message_ids,
            error: None,
        }
    }

    async fn send_with_retry(
        &self,
        channel: &dyn ChannelCapability,
        target: &ChannelTarget,
        text: &str,
        options: &SendOptions,
    ) -> rgbot_channels::Result<SendReceipt> {
        let max_attempts = self.settings.retry.attempts.max(1);
        let mut attempt = 1u32;
        loop {
            match channel.send(target, text, options).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let max_delay = Duration::from_millis(self.settings.retry.max_delay_ms);
                    let wait = e
                        .retry_after()
                        .map(|d| d.min(max_delay))
                        .unwrap_or_else(|| backoff_delay(&self.settings.retry, attempt));
                    warn!(
                        channel = %target.channel,
                        account_id = %target.account_id,
                        conversation_key = %target.chat_id,
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "transient send failure, retrying"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(dispatch_metrics::SEND_RETRIES_TOTAL, labels::CHANNEL => target.channel.as_str())
                        .increment(1);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Politely refuse an unauthorized command. Sent once, never retried.
    pub async fn send_refusal(
        &self,
        channel: &dyn ChannelCapability,
        plan: &OutboundPlan,
        command: &str,
    ) -> DispatchResult {
        let options = SendOptions {
            reply_to: plan.reply_to.clone(),
            silent: false,
        };
        debug!(
            channel = %plan.target.channel,
            conversation_key = %plan.target.chat_id,
            command,
            "refusing unauthorized command"
        );
        match channel
            .send(&plan.target, &self.settings.unauthorized_reply, &options)
            .await
        {
            Ok(receipt) => DispatchResult {
                delivered: 1,
                total: 1,
                message_ids: vec![receipt.message_id],
                error: None,
            },
            Err(e) => {
                warn!(
                    channel = %plan.target.channel,
                    command,
                    error = %e,
                    "could not deliver command refusal"
                );
                DispatchResult {
                    delivered: 0,
                    total: 1,
                    message_ids: Vec::new(),
                    error: Some(Error::PartialDelivery {
                        delivered: 0,
                        total: 1,
                        source: e,
                    }),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::envelope::{EnvelopeOptions, format},
        async_trait::async_trait,
        rgbot_channels::{InboundSink, MonitorHandle, ProbeResult},
        rgbot_common::types::{ChannelType, InboundEvent, SenderIdentity},
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    #[derive(Default)]
    struct MockChannel {
        sent: Mutex<Vec<(String, Option<String>)>>,
        /// 1-based send attempt numbers that fail permanently.
        fail_on: Vec<usize>,
        /// Transient failures before sends start succeeding.
        transient_failures: AtomicUsize,
        attempts: AtomicUsize,
        typing_started: AtomicUsize,
        typing_stopped: AtomicUsize,
    }

    impl MockChannel {
        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl ChannelCapability for MockChannel {
        fn channel(&self) -> ChannelType {
            ChannelType::Telegram
        }

        async fn probe(&self, _account_id: &str) -> rgbot_channels::Result<ProbeResult> {
            Ok(ProbeResult::ok())
        }

        async fn send(
            &self,
            _target: &ChannelTarget,
            content: &str,
            options: &SendOptions,
        ) -> rgbot_channels::Result<SendReceipt> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(rgbot_channels::Error::transient("connection reset"));
            }
            if self.fail_on.contains(&attempt) {
                return Err(rgbot_channels::Error::delivery("chat not found"));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((content.to_string(), options.reply_to.clone()));
            Ok(SendReceipt {
                message_id: format!("m{}", sent.len()),
            })
        }

        async fn send_typing(&self, _target: &ChannelTarget) -> rgbot_channels::Result<()> {
            self.typing_started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_typing(&self, _target: &ChannelTarget) -> rgbot_channels::Result<()> {
            self.typing_stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn monitor(
            &self,
            _account_id: &str,
            _sink: Arc<dyn InboundSink>,
        ) -> rgbot_channels::Result<MonitorHandle> {
            Ok(MonitorHandle::detached())
        }
    }

    struct FixedAgent {
        reply: Result<String, String>,
        delay: Duration,
    }

    impl FixedAgent {
        fn says(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl ReplyAgent for FixedAgent {
        async fn reply(&self, _request: &AgentRequest) -> anyhow::Result<String> {
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map_err(anyhow::Error::msg)
        }
    }

    fn request() -> AgentRequest {
        let event = InboundEvent::new(
            ChannelType::Telegram,
            "default",
            "42",
            SenderIdentity::new("7"),
            "hi",
        )
        .with_message_id("99");
        AgentRequest::new(format(&event, &EnvelopeOptions::default()))
    }

    fn plan(limit: usize) -> OutboundPlan {
        let mut plan = OutboundPlan::resolve(&request().envelope.channel_meta, None);
        plan.chunk_limit = limit;
        plan.chunk_mode = ChunkMode::Plain;
        plan
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            retry: RetryConfig {
                attempts: 3,
                base_delay_ms: 100,
                max_delay_ms: 1_000,
            },
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_chunks_in_order_with_reply_to_on_first() {
        let channel = Arc::new(MockChannel::default());
        let dispatcher = ReplyDispatcher::new(FixedAgent::says("aaa bbb ccc"), settings());

        let result = dispatcher
            .dispatch(&request(), channel.clone(), &plan(3))
            .await;

        assert!(!result.failed());
        assert_eq!((result.delivered, result.total), (3, 3));
        assert_eq!(result.message_ids, vec!["m1", "m2", "m3"]);
        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![
            ("aaa".to_string(), Some("99".to_string())),
            ("bbb".to_string(), None),
            ("ccc".to_string(), None),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_on_second_chunk_stops_delivery() {
        let channel = Arc::new(MockChannel {
            fail_on: vec![2],
            ..Default::default()
        });
        let dispatcher = ReplyDispatcher::new(FixedAgent::says("aaa bbb ccc"), settings());

        let result = dispatcher
            .dispatch(&request(), channel.clone(), &plan(3))
            .await;

        assert!(result.failed());
        assert!(result.is_partial());
        assert_eq!((result.delivered, result.total), (1, 3));
        assert_eq!(channel.texts(), vec!["aaa"]);
        // chunk 3 never attempted, chunk 2 never retried
        assert_eq!(channel.attempts.load(Ordering::SeqCst), 2);
        assert!(matches!(
            result.error,
            Some(Error::PartialDelivery {
                delivered: 1,
                total: 3,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn first_chunk_is_retried_on_transient_errors() {
        let channel = Arc::new(MockChannel {
            transient_failures: AtomicUsize::new(2),
            ..Default::default()
        });
        let dispatcher = ReplyDispatcher::new(FixedAgent::says("hello"), settings());

        let result = dispatcher
            .dispatch(&request(), channel.clone(), &plan(100))
            .await;

        assert!(!result.failed());
        assert_eq!(channel.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(channel.texts(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let channel = Arc::new(MockChannel {
            transient_failures: AtomicUsize::new(10),
            ..Default::default()
        });
        let dispatcher = ReplyDispatcher::new(FixedAgent::says("hello"), settings());

        let result = dispatcher
            .dispatch(&request(), channel.clone(), &plan(100))
            .await;

        assert!(result.failed());
        assert_eq!(result.delivered, 0);
        assert_eq!(channel.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn later_chunks_are_not_retried() {
        struct SecondChunkFlaky(MockChannel);

        #[async_trait]
        impl ChannelCapability for SecondChunkFlaky {
            fn channel(&self) -> ChannelType {
                self.0.channel()
            }

            async fn probe(&self, id: &str) -> rgbot_channels::Result<ProbeResult> {
                self.0.probe(id).await
            }

            async fn send(
                &self,
                target: &ChannelTarget,
                content: &str,
                options: &SendOptions,
            ) -> rgbot_channels::Result<SendReceipt> {
                if self.0.attempts.load(Ordering::SeqCst) == 1 {
                    self.0.attempts.fetch_add(1, Ordering::SeqCst);
                    return Err(rgbot_channels::Error::transient("timeout"));
                }
                self.0.send(target, content, options).await
            }

            async fn monitor(
                &self,
                id: &str,
                sink: Arc<dyn InboundSink>,
            ) -> rgbot_channels::Result<MonitorHandle> {
                self.0.monitor(id, sink).await
            }
        }

        let channel = SecondChunkFlaky(MockChannel::default());
        let dispatcher = ReplyDispatcher::new(FixedAgent::says("unused"), settings());
        let result = dispatcher.deliver(&channel, &plan(3), "aaa bbb ccc").await;

        assert_eq!((result.delivered, result.total), (1, 3));
        assert_eq!(channel.0.texts(), vec!["aaa"]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_reply_sends_nothing() {
        for reply in ["", "   ", "NO_REPLY"] {
            let channel = Arc::new(MockChannel::default());
            let dispatcher = ReplyDispatcher::new(FixedAgent::says(reply), settings());
            let result = dispatcher
                .dispatch(&request(), channel.clone(), &plan(100))
                .await;
            assert!(result.is_silent(), "{reply:?}");
            assert_eq!(channel.attempts.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn agent_error_is_reported_not_propagated() {
        let channel = Arc::new(MockChannel::default());
        let agent = Arc::new(FixedAgent {
            reply: Err("model overloaded".into()),
            delay: Duration::ZERO,
        });
        let dispatcher = ReplyDispatcher::new(agent, settings());
        let result = dispatcher
            .dispatch(&request(), channel.clone(), &plan(100))
            .await;
        assert!(matches!(result.error, Some(Error::Agent(_))));
        assert_eq!(channel.typing_stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn agent_timeout_is_enforced() {
        let channel = Arc::new(MockChannel::default());
        let agent = Arc::new(FixedAgent {
            reply: Ok("late".into()),
            delay: Duration::from_secs(120),
        });
        let dispatcher = ReplyDispatcher::new(agent, DispatchSettings {
            agent_timeout: Some(Duration::from_secs(30)),
            ..settings()
        });
        let result = dispatcher
            .dispatch(&request(), channel.clone(), &plan(100))
            .await;
        assert!(matches!(result.error, Some(Error::Timeout(d)) if d == Duration::from_secs(30)));
        assert!(channel.texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn typing_keepalive_runs_until_delivery_ends() {
        let channel = Arc::new(MockChannel::default());
        let agent = Arc::new(FixedAgent {
            reply: Ok("done".into()),
            delay: Duration::from_secs(10),
        });
        let dispatcher = ReplyDispatcher::new(agent, settings());
        let result = dispatcher
            .dispatch(&request(), channel.clone(), &plan(100))
            .await;

        assert!(!result.failed());
        // t=0, 4, 8
        assert_eq!(channel.typing_started.load(Ordering::SeqCst), 3);
        assert_eq!(channel.typing_stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_disabled_per_plan() {
        let channel = Arc::new(MockChannel::default());
        let dispatcher = ReplyDispatcher::new(FixedAgent::says("ok"), settings());
        let mut plan = plan(100);
        plan.typing = false;
        dispatcher.dispatch(&request(), channel.clone(), &plan).await;
        assert_eq!(channel.typing_started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tables_are_converted_before_chunking() {
        let channel = Arc::new(MockChannel::default());
        let dispatcher = ReplyDispatcher::new(FixedAgent::says("unused"), settings());
        let mut plan = plan(1_000);
        plan.table_mode = TableMode::Bullets;
        dispatcher
            .deliver(channel.as_ref(), &plan, "| k | v |\n|---|---|\n| a | 1 |")
            .await;
        assert_eq!(channel.texts(), vec!["**a**\n• v: 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_is_sent_once() {
        let channel = Arc::new(MockChannel {
            transient_failures: AtomicUsize::new(1),
            ..Default::default()
        });
        let dispatcher = ReplyDispatcher::new(FixedAgent::says("unused"), settings());
        let result = dispatcher
            .send_refusal(channel.as_ref(), &plan(100), "reset")
            .await;
        assert!(result.failed());
        assert_eq!(channel.attempts.load(Ordering::SeqCst), 1);

        let result = dispatcher
            .send_refusal(channel.as_ref(), &plan(100), "reset")
            .await;
        assert!(!result.failed());
        assert_eq!(channel.texts(), vec![
            "Sorry, you are not allowed to use that command here."
        ]);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryConfig {
            attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 3_000,
        };
        assert_eq!(backoff_delay(&retry, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&retry, 2), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&retry, 3), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(&retry, 4), Duration::from_millis(3_000));
    }

    #[test]
    fn human_delay_ranges() {
        assert_eq!(human_delay(&HumanDelayConfig::Off), None);
        let natural = human_delay(&HumanDelayConfig::Natural).unwrap();
        assert!((800..=2500).contains(&(natural.as_millis() as u64)));
        assert_eq!(
            human_delay(&HumanDelayConfig::Custom {
                min_ms: 300,
                max_ms: 100
            }),
            Some(Duration::from_millis(300))
        );
        assert_eq!(
            human_delay(&HumanDelayConfig::Custom { min_ms: 0, max_ms: 0 }),
            None
        );
    }

    #[test]
    fn plan_resolves_channel_settings() {
        let meta = request().envelope.channel_meta;
        let mut config = ChannelConfig::default();
        config.text_chunk_limit = Some(500);
        config.typing = Some(false);
        let plan = OutboundPlan::resolve(&meta, Some(&config));
        assert_eq!(plan.chunk_limit, 500);
        assert!(!plan.typing);
        assert_eq!(plan.reply_to.as_deref(), Some("99"));
        assert_eq!(plan.target.chat_id, "42");
        assert_eq!(plan.table_mode, TableMode::Code);
    }
}
