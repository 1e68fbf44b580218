use std::{collections::HashMap, sync::Arc};

use rgbot_common::types::ChannelType;

#[cfg(feature = "metrics")]
use rgbot_metrics::{channels as ch_metrics, gauge};

use crate::plugin::{ChannelCapability, NullChannel};

/// Registry of channel capabilities, keyed by platform.
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    capabilities: HashMap<ChannelType, Arc<dyn ChannelCapability>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same channel.
    pub fn register(&mut self, capability: Arc<dyn ChannelCapability>) {
        self.capabilities.insert(capability.channel(), capability);
        #[cfg(feature = "metrics")]
        gauge!(ch_metrics::ACTIVE).set(self.capabilities.len() as f64);
    }

    /// Adapter for `channel`, or a [`NullChannel`] when none is registered.
    pub fn get(&self, channel: ChannelType) -> Arc<dyn ChannelCapability> {
        match self.capabilities.get(&channel) {
            Some(capability) => Arc::clone(capability),
            None => Arc::new(NullChannel::new(channel)),
        }
    }

    pub fn is_registered(&self, channel: ChannelType) -> bool {
        self.capabilities.contains_key(&channel)
    }

    /// Registered channels, sorted.
    pub fn list(&self) -> Vec<ChannelType> {
        let mut channels: Vec<ChannelType> = self.capabilities.keys().copied().collect();
        channels.sort();
        channels
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            Result,
            plugin::{ChannelTarget, InboundSink, MonitorHandle, ProbeResult, SendOptions, SendReceipt},
        },
        async_trait::async_trait,
    };

    struct OkChannel;

    #[async_trait]
    impl ChannelCapability for OkChannel {
        fn channel(&self) -> ChannelType {
            ChannelType::Telegram
        }

        async fn probe(&self, _account_id: &str) -> Result<ProbeResult> {
            Ok(ProbeResult::ok())
        }

        async fn send(
            &self,
            _target: &ChannelTarget,
            _content: &str,
            _options: &SendOptions,
        ) -> Result<SendReceipt> {
            Ok(SendReceipt {
                message_id: "1".into(),
            })
        }

        async fn monitor(
            &self,
            _account_id: &str,
            _sink: Arc<dyn InboundSink>,
        ) -> Result<MonitorHandle> {
            Ok(MonitorHandle::detached())
        }
    }

    #[tokio::test]
    async fn unregistered_channels_fall_back_to_null() {
        let mut registry = ChannelRegistry::new();
        registry.register(Arc::new(OkChannel));

        assert!(registry.is_registered(ChannelType::Telegram));
        assert!(!registry.is_registered(ChannelType::Discord));
        assert_eq!(registry.list(), vec![ChannelType::Telegram]);

        let telegram = registry.get(ChannelType::Telegram);
        assert!(telegram.probe("default").await.unwrap().ok);

        let discord = registry.get(ChannelType::Discord);
        assert_eq!(discord.channel(), ChannelType::Discord);
        assert!(!discord.probe("default").await.unwrap().ok);
    }
}
