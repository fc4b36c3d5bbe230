use crate::notify::SubscriptionScope;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Per-connection reconciliation state, guarded by the session lock.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// Bumped by every event that changes the structural state enrichment is computed from.
    pub generation: u64,
    pub torn_down: bool,
    /// Addresses already subscribed to notifications during this session.
    pub seen: HashSet<String>,
}

/// One live wallet connection. Replaced wholesale when the same label reconnects.
#[derive(Debug)]
pub(crate) struct Session {
    pub label: String,
    pub state: Mutex<SessionState>,
    cancel: watch::Sender<Option<CancelReason>>,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The wallet was disconnected; its provider session is closed too.
    Disconnected,
    /// A new connection with the same label took over; the provider stays open.
    Replaced,
}

impl Session {
    pub fn new<'a>(label: &str, addresses: impl IntoIterator<Item = &'a str>) -> Arc<Self> {
        let (cancel, _) = watch::channel(None);
        let seen = addresses.into_iter().map(address_key).collect();
        Arc::new(Self {
            label: label.to_string(),
            state: Mutex::new(SessionState {
                generation: 0,
                torn_down: false,
                seen,
            }),
            cancel,
        })
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.cancel.subscribe(),
        }
    }

    /// Cancels the session. Only the first reason given is kept.
    pub fn cancel(&self, reason: CancelReason) {
        self.cancel.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.borrow().is_some()
    }
}

#[async_trait]
impl SubscriptionScope for Session {
    async fn record_if_live(&self, record: &(dyn Fn() + Send + Sync)) -> bool {
        let state = self.state.lock().await;
        if state.torn_down || self.is_cancelled() {
            return false;
        }
        record();
        true
    }
}

/// Observes the cancellation of one session.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<Option<CancelReason>>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolves once the session is cancelled. A session dropped without being cancelled counts
    /// as replaced.
    pub async fn cancelled(&mut self) -> CancelReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(CancelReason::Replaced),
            Err(_) => CancelReason::Replaced,
        }
    }
}

/// The key under which an address is tracked in per-session sets.
pub(crate) fn address_key(address: &str) -> String {
    if address.starts_with("0x") {
        address.to_lowercase()
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_observes_cancel() {
        let session = Session::new("W", ["0xAB"]);
        let mut token = session.token();
        assert!(!token.is_cancelled());
        assert!(session.state.lock().await.seen.contains("0xab"));

        session.cancel(CancelReason::Replaced);
        session.cancel(CancelReason::Disconnected);
        assert_eq!(token.cancelled().await, CancelReason::Replaced);
        assert!(token.is_cancelled());
        assert!(session.is_cancelled());
    }
}
