//! Owns the live backend session and restores it after a drop.
//!
//! The session sits in a single read/write-locked slot. Publishers clone the
//! `Arc` out under the read lock; reconnection installs a whole new session
//! under the write lock, so nobody ever sees a half-replaced handle.
//!
//! ```text
//! Connecting ──> Connected ──(disconnect)──> Reconnecting ──> Connected
//!                                                  │
//!                                                  └──> ExhaustedRetries
//! ```
//!
//! Reconnection runs on a supervisor task spawned at construction. It waits
//! on the session's [`DisconnectNotice`], never inside the backend's own
//! reader, and backs off linearly: attempt `i` waits `i × reconnect_delay`.

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::transport::{Backend, DisconnectNotice, Established};
use faasq_core::ConnectionState;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct Shared<B: Backend> {
    config: QueueConfig,
    backend: B,
    live: RwLock<Arc<B::Session>>,
    state: watch::Sender<ConnectionState>,
}

/// Maintains exactly one usable session to the backend.
pub struct ConnectionManager<B: Backend> {
    shared: Arc<Shared<B>>,
    supervisor: JoinHandle<()>,
}

impl<B: Backend> ConnectionManager<B> {
    /// Validate `config` and open the first session.
    ///
    /// Fails outright if that first connect fails; no manager exists without
    /// a session.
    pub async fn connect(config: QueueConfig, backend: B) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(ConnectionState::Connecting);

        info!(url = %config.url, client_id = %config.client_id, "Opening connection");
        let Established { session, lost } = backend.connect(&config).await?;
        info!(url = %config.url, "Connected");
        state.send_replace(ConnectionState::Connected);

        let shared = Arc::new(Shared {
            config,
            backend,
            live: RwLock::new(Arc::new(session)),
            state,
        });
        let supervisor = tokio::spawn(supervise(shared.clone(), lost));
        Ok(Self { shared, supervisor })
    }

    /// Snapshot of the live session. The lock is released before returning.
    pub async fn current(&self) -> Arc<B::Session> {
        self.shared.live.read().await.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }
}

impl<B: Backend> Drop for ConnectionManager<B> {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

async fn supervise<B: Backend>(shared: Arc<Shared<B>>, mut lost: DisconnectNotice) {
    loop {
        let cause = lost.wait().await;
        warn!(url = %shared.config.url, %cause, "Disconnected");
        match shared.reconnect().await {
            Some(next) => lost = next,
            None => return,
        }
    }
}

impl<B: Backend> Shared<B> {
    /// Run the bounded reconnect protocol. Returns the new session's notice,
    /// or `None` once every attempt has failed.
    async fn reconnect(&self) -> Option<DisconnectNotice> {
        let max = self.config.max_reconnect;
        let url = &self.config.url;
        info!(%url, max_attempts = max, "Reconnect");

        for attempt in 0..max {
            self.state
                .send_replace(ConnectionState::Reconnecting { attempt: attempt + 1 });
            let wait = self.config.reconnect_wait(attempt);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            match self.backend.connect(&self.config).await {
                Ok(Established { session, lost }) => {
                    *self.live.write().await = Arc::new(session);
                    self.state.send_replace(ConnectionState::Connected);
                    info!("Reconnecting ({}/{}) to {}. OK", attempt + 1, max, url);
                    return Some(lost);
                }
                Err(e) => {
                    warn!(error = %e, "Reconnecting ({}/{}) to {} failed", attempt + 1, max, url);
                }
            }
        }

        let exhausted = QueueError::ReconnectExhausted {
            url: url.clone(),
            attempts: max,
        };
        error!(error = %exhausted, "Reached reconnection limit ({}) for {}", max, url);
        self.state.send_replace(ConnectionState::ExhaustedRetries);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::transport::Session;
    use std::time::Duration;
    use tokio::time::Instant;

    fn config(max_reconnect: u32, delay: Duration) -> QueueConfig {
        QueueConfig::new("local", 4222, "faas-cluster", "", "gw-1")
            .with_url("memory://local")
            .with_max_reconnect(max_reconnect)
            .with_reconnect_delay(delay)
    }

    /// Poll `cond` on the (usually paused) clock until it holds.
    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..100_000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition never held");
    }

    fn reconnected(manager: &ConnectionManager<MemoryBackend>, sessions: u64) -> bool {
        manager.backend().sessions_opened() == sessions
            && manager.state() == ConnectionState::Connected
    }

    /// Assert `gap` is `expected`, allowing for timer-wheel rounding.
    fn assert_gap(gap: Duration, expected: Duration) {
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(20),
            "gap {gap:?}, expected {expected:?}"
        );
    }

    #[tokio::test]
    async fn construction_installs_session() {
        let backend = MemoryBackend::new();
        let manager = ConnectionManager::connect(config(3, Duration::ZERO), backend.clone())
            .await
            .unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.current().await.id(), 1);
        assert_eq!(backend.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn construction_fails_when_first_connect_fails() {
        let backend = MemoryBackend::new();
        backend.set_available(false);
        let err = ConnectionManager::connect(config(3, Duration::ZERO), backend.clone())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, QueueError::Connection { .. }));
        assert_eq!(backend.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn invalid_config_never_dials() {
        let backend = MemoryBackend::new();
        let mut bad = config(3, Duration::ZERO);
        bad.client_id.clear();
        let err = ConnectionManager::connect(bad, backend.clone()).await.err().unwrap();
        assert!(matches!(err, QueueError::InvalidConfig(_)));
        assert_eq!(backend.connect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_disconnect() {
        let backend = MemoryBackend::new();
        let manager = ConnectionManager::connect(config(3, Duration::from_secs(1)), backend.clone())
            .await
            .unwrap();
        let first = manager.current().await;

        backend.drop_connection("eof");
        eventually(|| reconnected(&manager, 2)).await;

        let second = manager.current().await;
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(second.id(), 2);
        assert_eq!(backend.connect_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_waits_grow_linearly() {
        let backend = MemoryBackend::new();
        let manager = ConnectionManager::connect(config(4, Duration::from_secs(1)), backend.clone())
            .await
            .unwrap();

        backend.set_available(false);
        let dropped_at = Instant::now();
        backend.drop_connection("eof");
        eventually(|| manager.state() == ConnectionState::ExhaustedRetries).await;

        // Initial connect plus four reconnect attempts.
        let times = backend.attempt_times();
        assert_eq!(times.len(), 5);
        assert_gap(times[1] - dropped_at, Duration::ZERO);
        for i in 2..times.len() {
            let expected = Duration::from_secs((i - 1) as u64);
            assert_gap(times[i] - times[i - 1], expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_terminal() {
        let backend = MemoryBackend::new();
        let manager = ConnectionManager::connect(config(3, Duration::from_millis(10)), backend.clone())
            .await
            .unwrap();

        let mut states = manager.subscribe();
        backend.set_available(false);
        backend.drop_connection("eof");
        states.wait_for(ConnectionState::is_terminal).await.unwrap();
        assert_eq!(backend.connect_attempts(), 4);

        // Recovery of the backend alone does not revive the manager.
        backend.set_available(true);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.connect_attempts(), 4);
        assert_eq!(manager.state(), ConnectionState::ExhaustedRetries);

        let stale = manager.current().await;
        assert_eq!(stale.id(), 1);
        assert!(stale.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_gives_up_immediately() {
        let backend = MemoryBackend::new();
        let manager = ConnectionManager::connect(config(0, Duration::from_secs(1)), backend.clone())
            .await
            .unwrap();
        backend.drop_connection("eof");
        eventually(|| manager.state().is_terminal()).await;
        assert_eq!(backend.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn survives_repeated_disconnects() {
        let backend = MemoryBackend::new();
        let manager = ConnectionManager::connect(config(2, Duration::from_secs(1)), backend.clone())
            .await
            .unwrap();

        for expected_id in 2..=4 {
            backend.drop_connection("eof");
            eventually(|| reconnected(&manager, expected_id)).await;
            assert_eq!(manager.current().await.id(), expected_id);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_manager_stops_supervisor() {
        let backend = MemoryBackend::new();
        let manager = ConnectionManager::connect(config(3, Duration::ZERO), backend.clone())
            .await
            .unwrap();
        drop(manager);
        tokio::task::yield_now().await;

        backend.drop_connection("eof");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.connect_attempts(), 1);
    }
}
