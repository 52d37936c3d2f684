//! The seam between the connection manager and a concrete backend.

use crate::config::QueueConfig;
use crate::error::Result;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// A live session to the messaging backend.
///
/// Sessions are never repaired in place. Once closed they stay closed and the
/// manager swaps in a fresh one.
pub trait Session: Send + Sync + 'static {
    /// Hand `payload` to the backend under `subject`.
    fn publish(&self, subject: &str, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    fn is_closed(&self) -> bool;
}

/// Something that can open [`Session`]s.
pub trait Backend: Send + Sync + 'static {
    type Session: Session;

    /// Open a session. Failures are [`QueueError::Connection`](crate::QueueError::Connection).
    fn connect(
        &self,
        config: &QueueConfig,
    ) -> impl Future<Output = Result<Established<Self::Session>>> + Send;
}

/// A freshly opened session and the notice that fires when it drops.
pub struct Established<S> {
    pub session: S,
    pub lost: DisconnectNotice,
}

/// Resolves once with the cause of a session drop.
#[derive(Debug)]
pub struct DisconnectNotice(oneshot::Receiver<String>);

impl DisconnectNotice {
    pub fn channel() -> (DisconnectSender, Self) {
        let (tx, rx) = oneshot::channel();
        (DisconnectSender(Mutex::new(Some(tx))), Self(rx))
    }

    /// Wait for the drop. A sender that goes away silently counts as one.
    pub async fn wait(self) -> String {
        self.0
            .await
            .unwrap_or_else(|_| "session dropped".to_string())
    }
}

/// Fires a [`DisconnectNotice`]. Only the first call has any effect.
#[derive(Debug)]
pub struct DisconnectSender(Mutex<Option<oneshot::Sender<String>>>);

impl DisconnectSender {
    pub fn notify(&self, cause: impl Into<String>) {
        let tx = match self.0.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = tx {
            let _ = tx.send(cause.into());
        }
    }

    pub fn is_notified(&self) -> bool {
        match self.0.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_cause_wins() {
        let (tx, notice) = DisconnectNotice::channel();
        assert!(!tx.is_notified());
        tx.notify("read error");
        tx.notify("second");
        assert!(tx.is_notified());
        assert_eq!(notice.wait().await, "read error");
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_disconnect() {
        let (tx, notice) = DisconnectNotice::channel();
        drop(tx);
        assert_eq!(notice.wait().await, "session dropped");
    }
}
