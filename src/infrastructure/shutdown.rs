//! Shutdown Coordination
//!
//! A single `ShutdownController` is shared by the orchestrator, the refresh
//! scheduler and the status server. Shutdown flips a watch flag that every
//! long-running loop selects on; APY requests hold a [`RequestGuard`] so the
//! binary can wait for them to finish before exiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Shutdown flag plus in-flight APY request tracking.
#[derive(Clone)]
pub struct ShutdownController {
    flag: Arc<watch::Sender<bool>>,
    in_flight: Arc<InFlight>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Flip the shutdown flag. Idempotent; returns true on the first call.
    pub fn shutdown(&self) -> bool {
        let was_down = self.flag.send_replace(true);
        if !was_down {
            tracing::info!(
                "shutdown started with {} apy requests in flight",
                self.in_flight()
            );
        }
        !was_down
    }

    pub fn is_shutdown(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once shutdown has started, immediately if it already has.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        loop {
            let down = *rx.borrow_and_update();
            // The sender lives in `self`, so the channel cannot close under us
            if down || rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Mark an APY request as in flight until the guard drops.
    pub fn track_request(&self) -> RequestGuard {
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        RequestGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until no APY request is in flight.
    ///
    /// Returns false if requests are still running after `timeout`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.in_flight.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(timeout, idle).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    "drain timed out with {} apy requests in flight",
                    self.in_flight()
                );
                false
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the lifetime of one APY request.
pub struct RequestGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

/// Wait for Ctrl+C or SIGTERM, then start shutdown.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    controller.shutdown();
}
