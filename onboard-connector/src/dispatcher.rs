//! # Disconnect Bus
//!
//! A process-wide broadcast of wallet labels. Emitting a label requests teardown of that
//! wallet's session; every Event Bridge of the label observes it through a [`DisconnectSignal`].

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Clone)]
pub struct DisconnectBus {
    tx: broadcast::Sender<String>,
}

impl DisconnectBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Requests teardown of the wallet with the given label.
    pub fn emit(&self, label: &str) {
        // No receivers just means no wallet with a live bridge.
        if self.tx.send(label.to_string()).is_err() {
            tracing::debug!(label, "Disconnect emitted with no active listeners");
        }
    }

    /// Subscribes to disconnects of one label. Only emissions after this call are observed.
    pub fn subscribe(&self, label: &str) -> DisconnectSignal {
        DisconnectSignal {
            label: label.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug)]
pub struct DisconnectSignal {
    label: String,
    rx: broadcast::Receiver<String>,
}

impl DisconnectSignal {
    /// Resolves once the label is emitted, or when the bus itself is gone.
    pub async fn fired(&mut self) {
        loop {
            match self.rx.recv().await {
                Ok(label) if label == self.label => return,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    // Sessions are also cancelled directly, so a missed emission is not lost.
                    tracing::warn!(label = %self.label, skipped, "Disconnect signal lagged");
                    continue;
                }
                Err(RecvError::Closed) => return,
            }
        }
    }
}
