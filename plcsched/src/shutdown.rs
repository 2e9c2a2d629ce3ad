use tokio::sync::watch;

/// Create a connected shutdown handle and signal
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

/// Requests a cooperative stop of every task holding a [`ShutdownSignal`]
///
/// Dropping the handle has the same effect as calling [`ShutdownHandle::shutdown`].
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Observes a [`ShutdownHandle`]
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Request the shutdown
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Create another signal tied to this handle
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    /// true once shutdown has been requested
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Completes when shutdown is requested
    pub async fn requested(&mut self) {
        // an error means the handle was dropped
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
