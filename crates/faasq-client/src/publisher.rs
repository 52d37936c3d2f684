//! Hands invocation requests to the backend.

use crate::config::QueueConfig;
use crate::error::Result;
use crate::manager::ConnectionManager;
use crate::transport::{Backend, Session};
use faasq_core::InvocationRequest;
use serde::Serialize;

/// Publishes serialized requests over whatever session is currently live.
///
/// Never retries: a publish during an outage fails straight away and the
/// caller decides what to do. Safe to share across tasks.
pub struct QueuePublisher<B: Backend> {
    manager: ConnectionManager<B>,
}

impl<B: Backend> QueuePublisher<B> {
    /// Connect a new manager and wrap it.
    pub async fn connect(config: QueueConfig, backend: B) -> Result<Self> {
        Ok(Self::new(ConnectionManager::connect(config, backend).await?))
    }

    pub fn new(manager: ConnectionManager<B>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ConnectionManager<B> {
        &self.manager
    }

    /// Default topic for requests without an override.
    pub fn topic(&self) -> &str {
        &self.manager.config().topic
    }

    /// Queue `req` would be published to.
    pub fn route<'a>(&'a self, req: &'a InvocationRequest) -> &'a str {
        req.queue_override().unwrap_or_else(|| self.topic())
    }

    /// Queue an invocation request for asynchronous execution.
    pub async fn queue(&self, req: &InvocationRequest) -> Result<()> {
        let subject = self.route(req);
        tracing::debug!(function = %req.function, %subject, "Submitting request");
        self.publish_to(subject, req).await
    }

    /// Publish any serializable contract to `subject`.
    pub async fn publish_to<T>(&self, subject: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let payload = serde_json::to_vec(value).inspect_err(|e| {
            tracing::warn!(%subject, error = %e, "Failed to encode message");
        })?;

        let session = self.manager.current().await;
        session.publish(subject, payload).await
    }
}
