//! Inbound debouncer: coalesces rapid-fire events per conversation into a
//! single burst.
//!
//! Each key has at most one live timer; a new event restarts it. When the
//! window elapses the buffer is taken atomically and handed to a per-key
//! worker, so flushes for one key run strictly one after another in arrival
//! order while different keys flush concurrently.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use {
    async_trait::async_trait,
    rgbot_common::types::{ChannelType, InboundEvent},
    rgbot_config::{InboundConfig, validate::DEBOUNCE_MS_RANGE},
    tokio::{sync::mpsc, task::AbortHandle, time::Instant},
    tokio_util::task::TaskTracker,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use rgbot_metrics::{counter, debounce as debounce_metrics, gauge, histogram};

use crate::{Result, commands::has_control_command};

/// Something the debouncer can buffer.
pub trait DebounceItem: Send + 'static {
    /// Items with the same key are coalesced.
    fn debounce_key(&self) -> String;

    /// `false` flushes the item immediately (after any pending buffer for its
    /// key), bypassing the window.
    fn should_debounce(&self) -> bool {
        true
    }
}

impl DebounceItem for InboundEvent {
    fn debounce_key(&self) -> String {
        self.session_key()
    }

    /// Commands and media are handled right away.
    fn should_debounce(&self) -> bool {
        !self.is_command && self.attachments.is_empty() && !has_control_command(&self.raw_text)
    }
}

/// Receives flushed bursts. Errors are logged and swallowed by the debouncer.
#[async_trait]
pub trait FlushHandler<E>: Send + Sync + 'static {
    async fn on_flush(&self, key: &str, events: Vec<E>) -> Result<()>;
}

/// Resolve the debounce window for a channel: explicit override, then the
/// per-channel setting, then the global one, clamped to the allowed range.
pub fn resolve_inbound_debounce_ms(
    config: &InboundConfig,
    channel: ChannelType,
    override_ms: Option<u64>,
) -> u64 {
    let (min, max) = DEBOUNCE_MS_RANGE;
    override_ms
        .or_else(|| config.by_channel.get(&channel).copied())
        .unwrap_or(config.debounce_ms)
        .clamp(min, max)
}

type WindowFn<E> = Arc<dyn Fn(&E) -> Duration + Send + Sync>;

struct KeyState<E> {
    events: Vec<E>,
    timer: Option<AbortHandle>,
    /// Bumped on every change so a superseded timer can tell it lost.
    generation: u64,
}

/// Per-key FIFO of bursts waiting for (or in) the flush handler.
struct Worker<E> {
    tx: mpsc::UnboundedSender<Vec<E>>,
    task: AbortHandle,
}

struct State<E> {
    buffers: HashMap<String, KeyState<E>>,
    workers: HashMap<String, Worker<E>>,
    closed: bool,
}

struct Inner<E> {
    state: Mutex<State<E>>,
    handler: Arc<dyn FlushHandler<E>>,
    window: WindowFn<E>,
    tracker: TaskTracker,
}

/// Cheap to clone; clones share buffers and workers.
pub struct InboundDebouncer<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for InboundDebouncer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: DebounceItem> InboundDebouncer<E> {
    /// Debouncer with the same window for every item.
    pub fn new(handler: Arc<dyn FlushHandler<E>>, window: Duration) -> Self {
        Self::with_window_fn(handler, Arc::new(move |_: &E| window))
    }

    /// Debouncer whose window is chosen per item (e.g. per channel).
    pub fn with_window_fn(handler: Arc<dyn FlushHandler<E>>, window: WindowFn<E>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    buffers: HashMap::new(),
                    workers: HashMap::new(),
                    closed: false,
                }),
                handler,
                window,
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Buffer `item`, restarting its key's quiet-period timer.
    pub fn enqueue(&self, item: E) {
        let key = item.debounce_key();
        let mut state = self.inner.lock_state();
        if state.closed {
            warn!(key = %key, "debouncer shut down, dropping inbound event");
            return;
        }

        #[cfg(feature = "metrics")]
        counter!(debounce_metrics::EVENTS_ENQUEUED_TOTAL).increment(1);

        if !item.should_debounce() {
            if let Some(pending) = take_buffer(&mut state, &key) {
                self.inner.submit(&mut state, &key, pending);
            }
            debug!(key = %key, "flushing event immediately");
            self.inner.submit(&mut state, &key, vec![item]);
            return;
        }

        let deadline = Instant::now() + (self.inner.window)(&item);
        let entry = state.buffers.entry(key.clone()).or_insert_with(|| KeyState {
            events: Vec::new(),
            timer: None,
            generation: 0,
        });
        entry.events.push(item);
        entry.generation += 1;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        let generation = entry.generation;

        let inner = Arc::clone(&self.inner);
        let timer_key = key.clone();
        let handle = self.inner.tracker.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            inner.on_timer(&timer_key, generation);
        });
        if let Some(entry) = state.buffers.get_mut(&key) {
            entry.timer = Some(handle.abort_handle());
        }
        self.inner.report_pending(&state);
    }

    /// Drop the buffer for `key` without invoking the handler. Returns the
    /// number of discarded events. In-flight flushes are not affected.
    pub fn cancel(&self, key: &str) -> usize {
        let mut state = self.inner.lock_state();
        let dropped = take_buffer(&mut state, key).map_or(0, |events| events.len());
        if dropped > 0 {
            debug!(key, dropped, "debounce buffer cancelled");
            #[cfg(feature = "metrics")]
            counter!(debounce_metrics::CANCELLED_TOTAL).increment(dropped as u64);
        }
        self.inner.report_pending(&state);
        dropped
    }

    /// Drop every pending buffer without invoking the handler.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.inner.lock_state();
        let keys: Vec<String> = state.buffers.keys().cloned().collect();
        let dropped: usize = keys
            .iter()
            .filter_map(|key| take_buffer(&mut state, key))
            .map(|events| events.len())
            .sum();
        if dropped > 0 {
            debug!(dropped, "all debounce buffers cancelled");
            #[cfg(feature = "metrics")]
            counter!(debounce_metrics::CANCELLED_TOTAL).increment(dropped as u64);
        }
        self.inner.report_pending(&state);
        dropped
    }

    /// Flush `key` now instead of waiting for its window. Returns whether
    /// anything was pending.
    pub fn flush_now(&self, key: &str) -> bool {
        let mut state = self.inner.lock_state();
        match take_buffer(&mut state, key) {
            Some(events) => {
                self.inner.submit(&mut state, key, events);
                self.inner.report_pending(&state);
                true
            },
            None => false,
        }
    }

    /// Keys with a pending window, sorted.
    pub fn pending_keys(&self) -> Vec<String> {
        let state = self.inner.lock_state();
        let mut keys: Vec<String> = state
            .buffers
            .iter()
            .filter(|(_, s)| !s.events.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Stop accepting events, cancel pending windows without flushing, and
    /// wait up to `deadline` for in-flight flushes. Flushes still running at
    /// the deadline are aborted along with any bursts queued behind them.
    /// Returns `true` if every flush finished in time.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        self.inner.lock_state().closed = true;
        let dropped = self.cancel_all();
        self.inner.tracker.close();
        let drained = tokio::time::timeout(deadline, self.inner.tracker.wait())
            .await
            .is_ok();
        if drained {
            debug!(dropped, "debouncer shut down");
        } else {
            let aborted = self.inner.abort_workers();
            warn!(
                dropped,
                aborted,
                deadline_ms = deadline.as_millis() as u64,
                "debouncer shutdown deadline elapsed, aborting in-flight flushes"
            );
        }
        drained
    }
}

/// Remove a key's buffer, stopping its timer. `None` if nothing was pending.
fn take_buffer<E>(state: &mut State<E>, key: &str) -> Option<Vec<E>> {
    let entry = state.buffers.remove(key)?;
    if let Some(timer) = entry.timer {
        timer.abort();
    }
    (!entry.events.is_empty()).then_some(entry.events)
}

impl<E: DebounceItem> Inner<E> {
    fn lock_state(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report_pending(&self, _state: &State<E>) {
        #[cfg(feature = "metrics")]
        gauge!(debounce_metrics::PENDING_KEYS).set(_state.buffers.len() as f64);
    }

    fn on_timer(self: &Arc<Self>, key: &str, generation: u64) {
        let mut state = self.lock_state();
        let current = state.buffers.get(key).map(|s| s.generation);
        if current != Some(generation) {
            // Superseded by a newer event or cancelled.
            return;
        }
        if let Some(mut entry) = state.buffers.remove(key) {
            entry.timer = None;
            if !entry.events.is_empty() {
                self.submit(&mut state, key, entry.events);
            }
        }
        self.report_pending(&state);
    }

    /// Queue a burst behind any in-flight flush for `key`. Must be called with
    /// the state lock held so queue order matches arrival order.
    fn submit(self: &Arc<Self>, state: &mut State<E>, key: &str, events: Vec<E>) {
        if let Some(worker) = state.workers.get(key) {
            match worker.tx.send(events) {
                Ok(()) => return,
                // Worker gone; fall through and start a new one.
                Err(mpsc::error::SendError(events)) => {
                    state.workers.remove(key);
                    self.start_worker(state, key, events);
                },
            }
        } else {
            self.start_worker(state, key, events);
        }
    }

    fn start_worker(self: &Arc<Self>, state: &mut State<E>, key: &str, events: Vec<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        // Cannot fail: `rx` is alive.
        let _ = tx.send(events);
        let inner = Arc::clone(self);
        let worker_key = key.to_string();
        let task = self
            .tracker
            .spawn(async move { inner.run_worker(worker_key, rx).await })
            .abort_handle();
        state.workers.insert(key.to_string(), Worker { tx, task });
    }

    /// Abort every flush worker. Returns how many were still running.
    fn abort_workers(&self) -> usize {
        let workers: Vec<Worker<E>> = self.lock_state().workers.drain().map(|(_, w)| w).collect();
        let mut aborted = 0;
        for worker in workers {
            if !worker.task.is_finished() {
                worker.task.abort();
                aborted += 1;
            }
        }
        aborted
    }

    /// Drain the key's queue one burst at a time. Retires (under the state
    /// lock) once the queue is empty, so no burst can be lost in between.
    async fn run_worker(self: Arc<Self>, key: String, mut rx: mpsc::UnboundedReceiver<Vec<E>>) {
        loop {
            let batch = {
                let mut state = self.lock_state();
                match rx.try_recv() {
                    Ok(batch) => batch,
                    Err(_) => {
                        state.workers.remove(&key);
                        return;
                    },
                }
            };
            self.flush(&key, batch).await;
        }
    }

    async fn flush(&self, key: &str, events: Vec<E>) {
        let count = events.len();
        debug!(key, count, "flushing debounced burst");
        #[cfg(feature = "metrics")]
        {
            counter!(debounce_metrics::FLUSHES_TOTAL).increment(1);
            histogram!(debounce_metrics::BURST_SIZE).record(count as f64);
        }
        if let Err(e) = self.handler.on_flush(key, events).await {
            warn!(key, count, error = %e, "debounce flush failed");
            #[cfg(feature = "metrics")]
            counter!(debounce_metrics::FLUSH_ERRORS_TOTAL).increment(1);
        }
    }
}
