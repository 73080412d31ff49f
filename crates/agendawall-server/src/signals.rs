//! Unix signal handling for the daemon.
//!
//! - SIGTERM/SIGINT: graceful shutdown
//! - SIGHUP: refetch the timetable

use std::io;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

/// Turns process signals into shutdown and refresh notifications.
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    /// Bumped once per refresh request.
    refresh_tx: Arc<watch::Sender<u64>>,
    refresh_rx: watch::Receiver<u64>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (refresh_tx, refresh_rx) = watch::channel(0);

        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            refresh_tx: Arc::new(refresh_tx),
            refresh_rx,
        }
    }

    /// Installs the signal handlers and spawns the listener task.
    ///
    /// # Errors
    ///
    /// Fails when a handler cannot be installed.
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let shutdown_tx = self.shutdown_tx.clone();
        let refresh_tx = self.refresh_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("received SIGTERM, shutting down");
                        let _ = shutdown_tx.send(true);
                        break;
                    }
                    _ = sigint.recv() => {
                        info!("received SIGINT, shutting down");
                        let _ = shutdown_tx.send(true);
                        break;
                    }
                    _ = sighup.recv() => {
                        info!("received SIGHUP, refreshing timetable");
                        refresh_tx.send_modify(|n| *n += 1);
                    }
                }
            }
            debug!("signal listener stopped");
        });
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> io::Result<()> {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("received Ctrl+C, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });
        Ok(())
    }

    /// A future that completes when shutdown is signaled.
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_rx.clone(),
        }
    }

    /// Stream of refresh requests issued after this call.
    pub fn refresh_requests(&self) -> RefreshRequests {
        let mut rx = self.refresh_rx.clone();
        rx.mark_unchanged();
        RefreshRequests { rx }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn trigger_refresh(&self) {
        self.refresh_tx.send_modify(|n| *n += 1);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            rx: self.shutdown_rx.clone(),
        }
    }
}

/// Completes when shutdown is signaled.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(mut self) {
        // A dropped sender also ends the wait.
        let _ = self.rx.wait_for(|down| *down).await;
    }
}

/// Pending refresh requests; bursts collapse into one.
pub struct RefreshRequests {
    rx: watch::Receiver<u64>,
}

impl RefreshRequests {
    /// Waits for the next request. Returns `false` once no more can come.
    pub async fn next(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// A handle for triggering or checking shutdown status.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_shutdown_flags_handler_and_handles() {
        let handler = SignalHandler::new();
        let handle = handler.shutdown_handle();
        assert!(!handler.is_shutdown());

        handle.trigger();
        assert!(handler.is_shutdown());
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn shutdown_signal_wakes_waiters() {
        let handler = SignalHandler::new();
        let handle = handler.shutdown_handle();
        let waiter = tokio::spawn(handler.shutdown().wait());

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.trigger();

        let result = tokio::time::timeout(Duration::from_millis(200), waiter).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn already_triggered_shutdown_returns_at_once() {
        let handler = SignalHandler::new();
        handler.trigger_shutdown();
        tokio::time::timeout(Duration::from_millis(50), handler.shutdown().wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_requests_collapse_bursts() {
        let handler = SignalHandler::new();
        handler.trigger_refresh();
        // Issued before subscribing: not seen.
        let mut requests = handler.refresh_requests();

        handler.trigger_refresh();
        handler.trigger_refresh();
        assert!(requests.next().await);
        let pending = tokio::time::timeout(Duration::from_millis(20), requests.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn refresh_requests_end_with_handler() {
        let handler = SignalHandler::new();
        let mut requests = handler.refresh_requests();
        drop(handler);
        assert!(!requests.next().await);
    }
}
