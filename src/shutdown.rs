//! Cooperative cancellation for long running relays

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable stop signal.
///
/// Every clone observes the same trigger. A `Shutdown` that is never
/// triggered leaves the dispatcher running until the process is killed.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a new, untriggered signal
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Ask everything holding this signal to stop
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has been triggered
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal is triggered
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so this only ends on a trigger
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Run `fut` unless the signal fires first.
    ///
    /// Returns `None` when cancelled.
    pub async fn guard<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_triggered() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.triggered() => None,
            output = fut => Some(output),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
