//! # Event Bridge
//!
//! A [`WalletListener`] turns one wallet's native provider notifications into a stream of
//! [`WalletEvent`]s, scoped to the lifetime of one connection.
//!
//! For EVM wallets it registers `accountsChanged` and `chainChanged` handlers on the provider
//! and removes exactly those handlers again on teardown. Substrate extensions have no
//! notifications, so their stream only ever carries the final `Disconnected`.
//!
//! Teardown is triggered by the session's cancel token or by the label's disconnect signal.
//! Either one closes the stream with a single `Disconnected` event; provider notifications that
//! arrive afterwards, even from a provider that ignores `remove_listener`, are dropped. The
//! provider's own `disconnect` is called unless the session was replaced by a reconnect.

use crate::dispatcher::DisconnectSignal;
use crate::events::{parse_accounts, parse_chain_id, WalletEvent, WalletEventData};
use crate::provider::{ListenerId, ProviderEventKind, ProviderListener, WalletProvider};
use crate::workers::{CancelReason, CancelToken};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared between the registered provider handlers, the guard task and the listener.
struct Attachment {
    label: String,
    provider: WalletProvider,
    /// `None` once the stream is closed. Checked under the lock on every delivery.
    sender: Mutex<Option<mpsc::UnboundedSender<WalletEvent>>>,
    handlers: Mutex<Vec<(ProviderEventKind, ListenerId)>>,
}

impl Attachment {
    fn forward(&self, data: WalletEventData) {
        if let Some(tx) = lock(&self.sender).as_ref() {
            let _ = tx.send(WalletEvent {
                label: self.label.clone(),
                data,
            });
        } else {
            tracing::trace!(label = %self.label, "Dropping provider event after disconnect");
        }
    }

    /// Closes the stream with a final `Disconnected`. Returns `false` if it was already closed.
    fn close(&self) -> bool {
        let Some(tx) = lock(&self.sender).take() else {
            return false;
        };
        let _ = tx.send(WalletEvent {
            label: self.label.clone(),
            data: WalletEventData::Disconnected,
        });
        true
    }

    /// Removes every provider handler this attachment registered. Idempotent.
    fn detach(&self) {
        let handlers = std::mem::take(&mut *lock(&self.handlers));
        if let Some(provider) = self.provider.as_evm() {
            for (kind, id) in handlers {
                provider.remove_listener(kind, id);
            }
        }
    }

    async fn shutdown(&self, close_provider: bool) {
        if self.close() {
            tracing::debug!(label = %self.label, "Event bridge detached");
        }
        self.detach();
        if !close_provider {
            return;
        }
        if let Some(provider) = self.provider.as_evm() {
            if let Err(e) = provider.disconnect().await {
                tracing::warn!(label = %self.label, "Provider disconnect failed: {}", e);
            }
        }
    }
}

type ParseFn = fn(&Value) -> anyhow::Result<WalletEventData>;

fn handler(attachment: Weak<Attachment>, parse: ParseFn) -> ProviderListener {
    Arc::new(move |payload: Value| {
        let Some(attachment) = attachment.upgrade() else {
            return;
        };
        match parse(&payload) {
            Ok(data) => attachment.forward(data),
            Err(e) => tracing::warn!(label = %attachment.label, "Ignoring malformed provider event: {}", e),
        }
    })
}

fn accounts_changed(payload: &Value) -> anyhow::Result<WalletEventData> {
    parse_accounts(payload).map(WalletEventData::AccountsChanged)
}

fn chain_changed(payload: &Value) -> anyhow::Result<WalletEventData> {
    parse_chain_id(payload).map(WalletEventData::ChainChanged)
}

/// The event stream of one wallet connection.
pub struct WalletListener {
    rx: mpsc::UnboundedReceiver<WalletEvent>,
    attachment: Arc<Attachment>,
}

impl WalletListener {
    /// Attaches to the wallet's provider and spawns the teardown guard.
    pub fn attach(
        label: &str,
        provider: &WalletProvider,
        mut cancel: CancelToken,
        mut disconnect: DisconnectSignal,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let attachment = Arc::new(Attachment {
            label: label.to_string(),
            provider: provider.clone(),
            sender: Mutex::new(Some(tx)),
            handlers: Mutex::new(Vec::new()),
        });

        if let Some(evm) = provider.as_evm() {
            let registered = [
                (ProviderEventKind::AccountsChanged, accounts_changed as ParseFn),
                (ProviderEventKind::ChainChanged, chain_changed as ParseFn),
            ]
            .into_iter()
            .map(|(kind, parse)| {
                let id = evm.on(kind, handler(Arc::downgrade(&attachment), parse));
                (kind, id)
            })
            .collect();
            *lock(&attachment.handlers) = registered;
        }

        let guard = attachment.clone();
        tokio::spawn(async move {
            let close_provider = tokio::select! {
                reason = cancel.cancelled() => reason == CancelReason::Disconnected,
                _ = disconnect.fired() => true,
            };
            guard.shutdown(close_provider).await;
        });

        tracing::debug!(label, namespace = %provider.namespace(), "Event bridge attached");
        Self { rx, attachment }
    }

    /// Receives the next event. Returns `None` once the stream is closed and drained.
    pub async fn next_event(&mut self) -> Option<WalletEvent> {
        self.rx.recv().await
    }
}

impl Drop for WalletListener {
    fn drop(&mut self) {
        lock(&self.attachment.sender).take();
        self.attachment.detach();
    }
}
