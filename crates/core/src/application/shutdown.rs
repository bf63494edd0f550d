// Service Shutdown Token

use tokio::sync::watch;

/// Why the hosted service is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM / SIGINT / Ctrl-C
    Signal,
    /// `admin.shutdown.v1` from a loopback client
    AdminRequest,
}

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    pub async fn wait(&mut self) -> ShutdownReason {
        loop {
            if let Some(reason) = *self.rx.borrow_and_update() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                // Sender dropped without a request: treat as a signal
                return ShutdownReason::Signal;
            }
        }
    }
}

/// Shutdown sender
#[derive(Clone)]
pub struct ShutdownSender {
    tx: watch::Sender<Option<ShutdownReason>>,
}

impl ShutdownSender {
    /// Request shutdown; the first reason wins
    pub fn shutdown(&self, reason: ShutdownReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(None);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
