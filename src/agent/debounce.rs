//! Per-channel quiet-period timers.
//!
//! Every inbound message restarts its channel's timer. When a timer survives
//! the full quiet period the burst is handed to a [`BurstHandler`]. Fired
//! handlers run to completion under a per-channel lane lock, so a channel
//! never has two dispatches in flight.

use crate::ChannelId;
use crate::error::Result;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Receives a channel once its burst has gone quiet.
#[async_trait]
pub trait BurstHandler: Send + Sync + 'static {
    async fn handle_burst(&self, channel_id: ChannelId) -> Result<()>;
}

struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

type Lane = Arc<tokio::sync::Mutex<()>>;

struct Shared {
    handler: Arc<dyn BurstHandler>,
    quiet_period: Duration,
    timers: Mutex<HashMap<ChannelId, PendingTimer>>,
    lanes: Mutex<HashMap<ChannelId, Lane>>,
    next_generation: AtomicU64,
}

/// Owns the timer map. Dropping the debouncer aborts every pending timer.
pub struct ChannelDebouncer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ChannelDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDebouncer")
            .field("quiet_period", &self.shared.quiet_period)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ChannelDebouncer {
    pub fn new(handler: Arc<dyn BurstHandler>, quiet_period: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler,
                quiet_period,
                timers: Mutex::new(HashMap::new()),
                lanes: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Restart the channel's quiet-period timer.
    pub fn on_message(&self, channel_id: ChannelId) {
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut timers = lock(&self.shared.timers);

        if let Some(previous) = timers.remove(&channel_id) {
            previous.handle.abort();
            tracing::debug!(channel_id, "resetting debounce timer");
        }

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move { shared.fire(channel_id, generation).await });
        timers.insert(channel_id, PendingTimer { generation, handle });
    }

    /// Number of channels with a timer still waiting out its quiet period.
    pub fn pending_count(&self) -> usize {
        lock(&self.shared.timers).len()
    }

    pub fn is_pending(&self, channel_id: ChannelId) -> bool {
        lock(&self.shared.timers).contains_key(&channel_id)
    }

    /// Abort every pending timer. Dispatches already in flight finish.
    pub fn cancel_all(&self) {
        let mut timers = lock(&self.shared.timers);
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for ChannelDebouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl Shared {
    async fn fire(self: Arc<Self>, channel_id: ChannelId, generation: u64) {
        tokio::time::sleep(self.quiet_period).await;

        {
            let mut timers = lock(&self.timers);
            match timers.get(&channel_id) {
                Some(timer) if timer.generation == generation => {
                    timers.remove(&channel_id);
                }
                // Superseded by a newer message.
                _ => return,
            }
        }

        let lane = self.lane(channel_id);
        {
            let _guard = lane.lock().await;
            tracing::debug!(channel_id, "quiet period elapsed, dispatching burst");
            if let Err(error) = self.handler.handle_burst(channel_id).await {
                tracing::error!(%error, channel_id, "burst dispatch failed");
            }
        }
        drop(lane);
        self.prune_lane(channel_id);
    }

    fn lane(&self, channel_id: ChannelId) -> Lane {
        lock(&self.lanes).entry(channel_id).or_default().clone()
    }

    fn prune_lane(&self, channel_id: ChannelId) {
        let mut lanes = lock(&self.lanes);
        if lanes
            .get(&channel_id)
            .is_some_and(|lane| Arc::strong_count(lane) == 1)
        {
            lanes.remove(&channel_id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, sleep};

    #[derive(Debug, Clone, Copy)]
    struct Call {
        channel_id: ChannelId,
        started: Instant,
        finished: Instant,
    }

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<Call>>,
        work: Duration,
        fail_first: bool,
    }

    impl RecordingHandler {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl BurstHandler for RecordingHandler {
        async fn handle_burst(&self, channel_id: ChannelId) -> Result<()> {
            let started = Instant::now();
            if !self.work.is_zero() {
                sleep(self.work).await;
            }
            let first = {
                let mut calls = self.calls.lock().expect("calls lock");
                calls.push(Call {
                    channel_id,
                    started,
                    finished: Instant::now(),
                });
                calls.len() == 1
            };
            if self.fail_first && first {
                return Err(anyhow::anyhow!("provider exploded").into());
            }
            Ok(())
        }
    }

    const QUIET: Duration = Duration::from_secs(2);

    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(20),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn burst_produces_one_dispatch_after_last_message() {
        let handler = Arc::new(RecordingHandler::default());
        let debouncer = ChannelDebouncer::new(handler.clone(), QUIET);
        let start = Instant::now();

        debouncer.on_message(1);
        sleep(Duration::from_millis(500)).await;
        debouncer.on_message(1);
        sleep(Duration::from_millis(500)).await;
        debouncer.on_message(1);
        assert_eq!(debouncer.pending_count(), 1);

        sleep(Duration::from_secs(5)).await;

        let calls = handler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].channel_id, 1);
        assert_near(calls[0].started - start, Duration::from_secs(3));
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn channels_do_not_delay_each_other() {
        let handler = Arc::new(RecordingHandler::default());
        let debouncer = ChannelDebouncer::new(handler.clone(), QUIET);
        let start = Instant::now();

        debouncer.on_message(1);
        sleep(Duration::from_millis(1500)).await;
        debouncer.on_message(2);
        assert!(debouncer.is_pending(1));
        assert!(debouncer.is_pending(2));

        sleep(Duration::from_secs(5)).await;

        let calls = handler.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].channel_id, 1);
        assert_near(calls[0].started - start, Duration::from_secs(2));
        assert_eq!(calls[1].channel_id, 2);
        assert_near(calls[1].started - start, Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn handler_error_keeps_channel_responsive() {
        let handler = Arc::new(RecordingHandler {
            fail_first: true,
            ..Default::default()
        });
        let debouncer = ChannelDebouncer::new(handler.clone(), QUIET);

        debouncer.on_message(7);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(handler.calls().len(), 1);
        assert!(!debouncer.is_pending(7));

        debouncer.on_message(7);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(handler.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn message_during_dispatch_waits_for_it() {
        let handler = Arc::new(RecordingHandler {
            work: Duration::from_secs(5),
            ..Default::default()
        });
        let debouncer = ChannelDebouncer::new(handler.clone(), QUIET);

        debouncer.on_message(3);
        sleep(Duration::from_millis(2100)).await;
        // First dispatch is in flight; this starts a second burst.
        debouncer.on_message(3);
        sleep(Duration::from_secs(20)).await;

        let calls = handler.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].started >= calls[0].finished);
        assert!(lock(&debouncer.shared.lanes).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_debouncer_cancels_pending_timers() {
        let handler = Arc::new(RecordingHandler::default());
        let debouncer = ChannelDebouncer::new(handler.clone(), QUIET);

        debouncer.on_message(1);
        debouncer.on_message(2);
        drop(debouncer);

        sleep(Duration::from_secs(5)).await;
        assert!(handler.calls().is_empty());
    }
}
