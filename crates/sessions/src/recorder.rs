//! Commits the last known route of a conversation once per inbound burst.

use std::{sync::Arc, time::Instant};

use {
    dashmap::DashMap,
    rgbot_common::{Clock, SystemClock},
    tokio::sync::Mutex,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use rgbot_metrics::{counter, histogram, labels, sessions as session_metrics};

use crate::{
    error::Result,
    route::{RouteKey, RouteTarget, SessionRoute},
    store::RouteStore,
};

/// Outcome of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub route: SessionRoute,
    /// Whether the stored target differs from the previous one.
    pub target_changed: bool,
}

/// Serializes commits per conversation and stamps them with a monotonic
/// `updated_at`. Different conversations never share a lock.
pub struct SessionRecorder {
    store: Arc<dyn RouteStore>,
    locks: DashMap<RouteKey, Arc<Mutex<()>>>,
    clock: Arc<dyn Clock>,
}

impl SessionRecorder {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn RouteStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            clock,
        }
    }

    fn key_lock(&self, key: &RouteKey) -> Arc<Mutex<()>> {
        // The shard guard is dropped before any await.
        Arc::clone(self.locks.entry(key.clone()).or_default().value())
    }

    /// Record `target` as the route for `key`.
    ///
    /// Idempotent: committing the same target again leaves it unchanged and
    /// only advances `updated_at`, which never goes backwards even if the
    /// wall clock does.
    pub async fn commit(&self, key: &RouteKey, target: RouteTarget) -> Result<Committed> {
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.commit_locked(key, target).await
        };
        drop(lock);
        // Only the map holds it now: no commit for this key is waiting.
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn commit_locked(&self, key: &RouteKey, target: RouteTarget) -> Result<Committed> {
        let started = Instant::now();

        let existing = self.store.load(key).await?;
        let now = self.clock.now_ms();
        let (created_at, updated_at, target_changed) = match &existing {
            Some(prev) => (
                prev.created_at,
                now.max(prev.updated_at),
                prev.last_route_target != target,
            ),
            None => (now, now, true),
        };
        let route = SessionRoute {
            channel: key.channel,
            account_id: key.account_id.clone(),
            conversation_key: key.conversation_key.clone(),
            last_route_target: target,
            created_at,
            updated_at,
        };
        let stored = self.store.upsert(&route).await?;

        #[cfg(feature = "metrics")]
        {
            let channel = key.channel.as_str();
            counter!(session_metrics::COMMITS_TOTAL, labels::CHANNEL => channel).increment(1);
            if target_changed {
                counter!(session_metrics::ROUTE_CHANGES_TOTAL, labels::CHANNEL => channel)
                    .increment(1);
            }
            histogram!(session_metrics::WRITE_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
        }
        debug!(
            route = %key,
            updated_at = stored.updated_at,
            target_changed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session route committed"
        );

        Ok(Committed {
            route: stored,
            target_changed,
        })
    }

    pub async fn load(&self, key: &RouteKey) -> Result<Option<SessionRoute>> {
        self.store.load(key).await
    }

    /// Timestamp of the last commit for `key`, in ms since the Unix epoch.
    pub async fn read_updated_at(&self, key: &RouteKey) -> Result<Option<u64>> {
        Ok(self.store.load(key).await?.map(|r| r.updated_at))
    }
}
