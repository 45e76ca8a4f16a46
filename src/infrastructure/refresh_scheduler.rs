//! Background Refresh Scheduler
//!
//! Periodically drives a refresh job and a cleanup job until shutdown.
//! Stops on the shared shutdown flag or on an explicit `stop()`.

use crate::infrastructure::shutdown::ShutdownController;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSchedulerConfig {
    /// Interval between refresh runs
    pub refresh_interval: Duration,
    /// Interval between cleanup runs
    pub cleanup_interval: Duration,
}

impl Default for RefreshSchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(120),
        }
    }
}

/// Owns the background task; at most one run per scheduler.
pub struct RefreshScheduler {
    config: RefreshSchedulerConfig,
    shutdown: ShutdownController,
    handle: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl RefreshScheduler {
    pub fn new(config: RefreshSchedulerConfig, shutdown: ShutdownController) -> Self {
        Self {
            config,
            shutdown,
            handle: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawn the background loop.
    ///
    /// The first tick of each interval is skipped: the caller is expected to
    /// pre-warm before starting. Returns false if already started, stopped,
    /// or shutdown has begun.
    pub fn start<R, RF, C>(&self, refresh: R, cleanup: C) -> bool
    where
        R: Fn() -> RF + Send + 'static,
        RF: Future<Output = ()> + Send + 'static,
        C: Fn() + Send + 'static,
    {
        let mut slot = self.handle.lock();
        if slot.is_some() || self.stopped.load(Ordering::SeqCst) || self.shutdown.is_shutdown() {
            return false;
        }

        let config = self.config.clone();
        let shutdown = self.shutdown.clone();

        *slot = Some(tokio::spawn(async move {
            let cancelled = shutdown.cancelled();
            tokio::pin!(cancelled);
            let mut refresh_tick = tokio::time::interval(config.refresh_interval);
            let mut cleanup_tick = tokio::time::interval(config.cleanup_interval);
            refresh_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            refresh_tick.tick().await;
            cleanup_tick.tick().await;

            loop {
                tokio::select! {
                    _ = &mut cancelled => {
                        tracing::info!("refresh scheduler received shutdown");
                        break;
                    }
                    _ = refresh_tick.tick() => refresh().await,
                    _ = cleanup_tick.tick() => cleanup(),
                }
            }
        }));

        tracing::info!(
            "refresh scheduler started (refresh every {:?}, cleanup every {:?})",
            self.config.refresh_interval,
            self.config.cleanup_interval
        );
        true
    }

    /// Cancel the background loop. Idempotent; returns true only on the
    /// call that actually stopped it.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }

        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                tracing::info!("refresh scheduler stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
