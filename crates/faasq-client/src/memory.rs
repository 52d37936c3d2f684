//! In-process backend for local development and tests.
//!
//! Every clone of a [`MemoryBackend`] shares the same state, so a test can keep
//! one handle to script outages while the manager owns another.

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::proto;
use crate::transport::{Backend, DisconnectNotice, DisconnectSender, Established, Session};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

/// A message accepted by a [`MemorySession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Which session carried it, counting from 1.
    pub session: u64,
}

#[derive(Debug)]
struct State {
    available: bool,
    fail_next: u32,
    attempts: Vec<Instant>,
    sessions: u64,
    live: Option<(Arc<AtomicBool>, Arc<DisconnectSender>)>,
    published: Vec<Published>,
}

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                available: true,
                fail_next: 0,
                attempts: Vec::new(),
                sessions: 0,
                live: None,
                published: Vec::new(),
            })),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// While unavailable every connect attempt fails.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Fail the next `n` connect attempts even while available.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Kill the live session and fire its disconnect notice.
    pub fn drop_connection(&self, cause: &str) {
        if let Some((closed, notice)) = self.lock().live.take() {
            closed.store(true, Ordering::Release);
            notice.notify(cause);
        }
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    /// When each connect attempt was made, oldest first.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().attempts.clone()
    }

    pub fn sessions_opened(&self) -> u64 {
        self.lock().sessions
    }

    pub fn published(&self) -> Vec<Published> {
        self.lock().published.clone()
    }
}

impl Backend for MemoryBackend {
    type Session = MemorySession;

    async fn connect(&self, config: &QueueConfig) -> Result<Established<MemorySession>> {
        let mut state = self.lock();
        state.attempts.push(Instant::now());

        if !state.available || state.fail_next > 0 {
            state.fail_next = state.fail_next.saturating_sub(1);
            return Err(QueueError::Connection {
                url: config.url.clone(),
                reason: "backend unavailable".to_string(),
            });
        }

        state.sessions += 1;
        let closed = Arc::new(AtomicBool::new(false));
        let (notice, lost) = DisconnectNotice::channel();
        let notice = Arc::new(notice);
        // A superseded session is dead even if nobody announced it.
        if let Some((old, _)) = state.live.replace((closed.clone(), notice)) {
            old.store(true, Ordering::Release);
        }

        Ok(Established {
            session: MemorySession {
                id: state.sessions,
                closed,
                backend: self.clone(),
            },
            lost,
        })
    }
}

#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    closed: Arc<AtomicBool>,
    backend: MemoryBackend,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Session for MemorySession {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let fail = |reason: String| QueueError::Publish {
            subject: subject.to_string(),
            reason,
        };
        if self.is_closed() {
            return Err(fail("connection is closed".to_string()));
        }
        proto::validate_subject(subject).map_err(|e| fail(e.to_string()))?;

        self.backend.lock().published.push(Published {
            subject: subject.to_string(),
            payload,
            session: self.id,
        });
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
