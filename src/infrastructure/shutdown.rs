//! Graceful Shutdown Handler
//!
//! Stops background jobs and lets in-flight classifications finish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Shutdown coordinator.
///
/// Background jobs hold a [`watch::Receiver`] and stop when it flips to
/// `true`. Classification requests hold a [`RequestGuard`]; once shutdown
/// starts no new guards are handed out.
#[derive(Clone)]
pub struct ShutdownController {
    shutdown_tx: Arc<watch::Sender<bool>>,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Receiver that observes `true` once shutdown has started.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Start shutdown. Idempotent.
    pub fn shutdown(&self) {
        let first = self.shutdown_tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
        if first {
            tracing::info!(in_flight = self.in_flight(), "initiating graceful shutdown");
            if self.in_flight() == 0 {
                self.drained.notify_waiters();
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Number of classification requests still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register a request, or `None` if shutdown has already started.
    pub fn begin_request(&self) -> Option<RequestGuard> {
        if self.is_shutdown() {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(RequestGuard {
            controller: self.clone(),
        })
    }

    fn request_finished(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 && self.is_shutdown() {
            self.drained.notify_waiters();
        }
    }

    /// Wait until no requests are in flight, up to `timeout`.
    ///
    /// Returns `false` if requests were still running when it gave up.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.drained.notified();
            if self.in_flight() == 0 {
                return true;
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        in_flight = self.in_flight(),
                        "drain timeout with requests still running"
                    );
                    return false;
                }
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one classification as running until dropped.
pub struct RequestGuard {
    controller: ShutdownController,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.controller.request_finished();
    }
}

/// Complete when Ctrl+C or SIGTERM arrives, then start shutdown.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    controller.shutdown();
}
