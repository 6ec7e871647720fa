//! Periodic background synchronization.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::engine::{SyncEngine, SyncOutcome};
use crate::config::MAX_DURATION_SECS;
use crate::connectivity::ConnectivityMonitor;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Longest accepted interval; longer values are clamped to it.
pub const MAX_SYNC_INTERVAL: Duration = Duration::from_secs(MAX_DURATION_SECS);

/// Runs [`SyncEngine::synchronize`] on a fixed interval while online.
///
/// The first tick fires one interval after [`start`](Self::start). With
/// reconnect syncing enabled (the default), coming back online triggers a
/// round right away as well.
#[derive(Debug)]
pub struct AutoSyncScheduler {
    engine: SyncEngine,
    monitor: ConnectivityMonitor,
    interval: Duration,
    sync_on_reconnect: bool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoSyncScheduler {
    pub fn new(engine: SyncEngine, monitor: ConnectivityMonitor, interval: Duration) -> Self {
        Self {
            engine,
            monitor,
            interval: interval.clamp(Duration::from_millis(1), MAX_SYNC_INTERVAL),
            sync_on_reconnect: true,
            task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_sync_on_reconnect(mut self, enabled: bool) -> Self {
        self.sync_on_reconnect = enabled;
        self
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the background task; returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut guard = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return false;
            }
            guard.take();
        }

        let engine = self.engine.clone();
        let reconnects = self.sync_on_reconnect.then(|| self.monitor.watch());
        let interval = self.interval;
        *guard = Some(tokio::spawn(run_loop(engine, interval, reconnects)));
        tracing::info!("Auto-sync started (every {}s)", interval.as_secs());
        true
    }

    /// Stop the background task; returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                handle.abort();
                tracing::info!("Auto-sync stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn run_loop(
    engine: SyncEngine,
    interval: Duration,
    mut reconnects: Option<watch::Receiver<bool>>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if let Some(receiver) = reconnects.as_mut() {
        receiver.borrow_and_update();
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if engine.is_online() {
                    run_background(&engine).await;
                } else {
                    tracing::debug!("Auto-sync tick skipped: offline");
                }
            }
            changed = wait_for_change(reconnects.as_mut()), if reconnects.is_some() => {
                if changed {
                    let online = reconnects
                        .as_mut()
                        .is_some_and(|receiver| *receiver.borrow_and_update());
                    if online {
                        tracing::info!("Back online; syncing now");
                        run_background(&engine).await;
                    }
                } else {
                    // Monitor dropped; keep ticking without reconnect triggers.
                    reconnects = None;
                }
            }
        }
    }
}

async fn wait_for_change(receiver: Option<&mut watch::Receiver<bool>>) -> bool {
    match receiver {
        Some(receiver) => receiver.changed().await.is_ok(),
        None => false,
    }
}

async fn run_background(engine: &SyncEngine) {
    match engine.synchronize().await {
        SyncOutcome::Failed(failure) => {
            tracing::warn!("Background sync failed: {}", failure.message);
        }
        SyncOutcome::SkippedOffline => tracing::debug!("Background sync skipped: offline"),
        SyncOutcome::Completed(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::MutationPayload;
    use crate::services::LocalStore;
    use crate::sync::{EngineOptions, PullDelta, RemoteAuthority};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_secs(60);

    #[derive(Default)]
    struct CountingRemote {
        pulls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteAuthority for CountingRemote {
        async fn pull(&self, _last_sync: Option<&str>) -> Result<PullDelta> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            Ok(PullDelta::default())
        }

        async fn push(&self, _payload: &MutationPayload) -> Result<()> {
            Ok(())
        }
    }

    async fn setup(online: bool) -> (AutoSyncScheduler, ConnectivityMonitor, Arc<CountingRemote>) {
        let store = LocalStore::in_memory();
        store.initialize().await.unwrap();
        let monitor = ConnectivityMonitor::new(online);
        let remote = Arc::new(CountingRemote::default());
        let engine = SyncEngine::new(
            store,
            Arc::clone(&remote) as Arc<dyn RemoteAuthority>,
            Arc::new(monitor.clone()),
            EngineOptions::default(),
        );
        let scheduler = AutoSyncScheduler::new(engine, monitor.clone(), INTERVAL);
        (scheduler, monitor, remote)
    }

    fn pulls(remote: &CountingRemote) -> usize {
        remote.pulls.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_runs_one_sync_per_interval() {
        let (scheduler, _monitor, remote) = setup(true).await;

        assert!(scheduler.start());
        assert!(!scheduler.start());

        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(pulls(&remote), 0);

        tokio::time::sleep(INTERVAL / 2 + Duration::from_millis(1)).await;
        assert_eq!(pulls(&remote), 1);

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(pulls(&remote), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_ticks_do_nothing() {
        let (scheduler, _monitor, remote) = setup(false).await;
        scheduler.start();

        tokio::time::sleep(INTERVAL * 3 + Duration::from_millis(1)).await;

        assert_eq!(pulls(&remote), 0);
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_triggers_immediate_sync() {
        let (scheduler, monitor, remote) = setup(false).await;
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        monitor.set_online(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pulls(&remote), 1);

        monitor.set_online(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pulls(&remote), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_trigger_can_be_disabled() {
        let (scheduler, monitor, remote) = setup(false).await;
        let scheduler = scheduler.with_sync_on_reconnect(false);
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        monitor.set_online(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pulls(&remote), 0);

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(pulls(&remote), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_interval_is_clamped() {
        let (scheduler, _monitor, remote) = setup(true).await;
        let engine = scheduler.engine.clone();
        let monitor = scheduler.monitor.clone();
        drop(scheduler);

        let scheduler = AutoSyncScheduler::new(engine, monitor, Duration::MAX);
        assert_eq!(scheduler.interval(), MAX_SYNC_INTERVAL);
        assert!(scheduler.start());

        tokio::time::sleep(MAX_SYNC_INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(pulls(&remote), 1);
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_future_ticks() {
        let (scheduler, _monitor, remote) = setup(true).await;

        assert!(scheduler.start());
        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        tokio::time::sleep(INTERVAL * 2).await;

        assert_eq!(pulls(&remote), 0);
        assert!(!scheduler.is_running());

        assert!(scheduler.start());
        tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(pulls(&remote), 1);
    }
}
